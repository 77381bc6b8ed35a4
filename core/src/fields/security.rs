//! Security attributes: one 6-octet rule per governed command.
//!
//! | octet | content                                                             |
//! |-------|---------------------------------------------------------------------|
//! | 1     | instruction governed (bit 0 clear: all secrets needed, set: any)    |
//! | 2     | global passwords 0-3 (high nibble), local passwords 0-3 (low)       |
//! | 3     | global keys 0-7                                                     |
//! | 4     | local keys 0-7                                                      |
//! | 5     | key for the secure messaging MAC, `FF` if none is required          |
//! | 6     | key for the secure messaging encryption, `FF` if none is required   |

use std::fmt::{Display, Formatter};

use super::short_hex;

pub const RULE_SIZE: usize = 6;

const NOT_REQUIRED: u8 = 0xFF;
const INS_ADMIN: u8 = 0x60;
const KEY_NUMBER_DONT_CARE: u8 = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GovernedCommand {
    /// The administrative command class.
    Admin,
    Instruction(u8),
}

impl Display for GovernedCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GovernedCommand::Admin => write!(f, "Admin commands"),
            GovernedCommand::Instruction(ins) => write!(f, "Command 0x{:02X}", ins),
        }
    }
}

/// Whether all of the listed secrets must be verified, or any one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Combinator {
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Secret {
    GlobalPassword(u8),
    LocalPassword(u8),
    GlobalKey(u8),
    LocalKey(u8),
}

impl Display for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Secret::GlobalPassword(n) => write!(f, "global password with number 0x{:x}", n),
            Secret::LocalPassword(n) => write!(f, "local password with number 0x{:x}", n),
            Secret::GlobalKey(n) => write!(f, "global key with number {}", n),
            Secret::LocalKey(n) => write!(f, "local key with number {}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum KeyScope {
    Global,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IvMode {
    Any,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum KeyNumber {
    Index(u8),
    /// Number `1F`: any key will do.
    DontCare,
    /// The octet does not name a key.
    Unspecified,
}

/// Which key secure messaging has to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KeyRequirement {
    pub scope: KeyScope,
    pub iv: IvMode,
    pub key: KeyNumber,
}

impl KeyRequirement {
    /// Decodes a key reference octet. Total over all octet values.
    pub fn decode(octet: u8) -> Self {
        Self {
            scope: match octet & 0x80 {
                0 => KeyScope::Global,
                _ => KeyScope::Local,
            },
            iv: match octet & 0x40 {
                0 => IvMode::Any,
                _ => IvMode::Random,
            },
            key: match (octet & 0x20, octet & 0x1F) {
                (0, KEY_NUMBER_DONT_CARE) => KeyNumber::DontCare,
                (0, n) => KeyNumber::Index(n),
                _ => KeyNumber::Unspecified,
            },
        }
    }
}

impl Display for KeyRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} key, {} IV",
            match self.scope {
                KeyScope::Global => "global",
                KeyScope::Local => "local",
            },
            match self.iv {
                IvMode::Any => "any",
                IvMode::Random => "random",
            }
        )?;

        match self.key {
            KeyNumber::Index(n) => write!(f, ", key with number: 0x{:02x}", n),
            KeyNumber::DontCare => write!(f, ", key with number: don't care"),
            KeyNumber::Unspecified => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EncryptionRequirement {
    NotRequired,
    Required(KeyRequirement),
    /// Encryption octets with bit 5 set are reserved.
    Reserved,
}

/// One access rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SecurityRule {
    pub raw: [u8; RULE_SIZE],
    pub command: GovernedCommand,
    pub combinator: Combinator,
    pub secrets: Vec<Secret>,
    pub mac: Option<KeyRequirement>,
    pub encryption: EncryptionRequirement,
}

impl SecurityRule {
    pub fn decode(raw: [u8; RULE_SIZE]) -> Self {
        let [ins, passwords, global_keys, local_keys, mac, enc] = raw;

        Self {
            raw,
            command: match ins & 0xFE {
                INS_ADMIN => GovernedCommand::Admin,
                other => GovernedCommand::Instruction(other),
            },
            combinator: match ins & 0x01 {
                0 => Combinator::All,
                _ => Combinator::Any,
            },
            secrets: secrets(passwords, global_keys, local_keys),
            mac: match mac {
                NOT_REQUIRED => None,
                octet => Some(KeyRequirement::decode(octet)),
            },
            encryption: match enc {
                NOT_REQUIRED => EncryptionRequirement::NotRequired,
                octet if octet & 0x20 != 0 => EncryptionRequirement::Reserved,
                octet => EncryptionRequirement::Required(KeyRequirement::decode(octet)),
            },
        }
    }

    /// Whether the rule needs neither secrets nor secure messaging.
    pub fn is_always_allowed(&self) -> bool {
        self.secrets.is_empty()
            && self.mac.is_none()
            && self.encryption == EncryptionRequirement::NotRequired
    }
}

/// Lists the secrets named by the password and key bit groups.
pub fn secrets(passwords: u8, global_keys: u8, local_keys: u8) -> Vec<Secret> {
    let global_passwords = (0..4)
        .filter(|k| passwords & (0x10 << k) != 0)
        .map(Secret::GlobalPassword);
    let local_passwords = (0..4)
        .filter(|k| passwords & (0x01 << k) != 0)
        .map(Secret::LocalPassword);
    let global_keys = (0..8)
        .filter(|k| global_keys & (0x01 << k) != 0)
        .map(Secret::GlobalKey);
    let local_keys = (0..8)
        .filter(|k| local_keys & (0x01 << k) != 0)
        .map(Secret::LocalKey);

    global_passwords
        .chain(local_passwords)
        .chain(global_keys)
        .chain(local_keys)
        .collect()
}

impl Display for SecurityRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;

        match self.secrets.as_slice() {
            [] => write!(f, " always allowed")?,
            [secret] => write!(f, " needs {}", secret)?,
            secrets => {
                let joiner = match self.combinator {
                    Combinator::All => "\n    AND ",
                    Combinator::Any => "\n     OR ",
                };
                let list = secrets
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(joiner);
                write!(f, " needs\n        {}", list)?;
            }
        }

        if self.mac.is_none()
            && self.encryption == EncryptionRequirement::NotRequired
            && self.secrets.len() <= 1
        {
            return write!(f, ", No secure messaging required");
        }

        match &self.mac {
            None => write!(f, "\nSecure messaging: no MAC required")?,
            Some(key) => write!(f, "\nCryptographic MAC with {}", key)?,
        }

        match &self.encryption {
            EncryptionRequirement::NotRequired => {
                write!(f, "\nSecure messaging: no encryption required")
            }
            EncryptionRequirement::Required(key) => write!(f, "\nEncryption with {}", key),
            EncryptionRequirement::Reserved => write!(f, "\nEncryption: RFU"),
        }
    }
}

/// A security attributes value: a sequence of rules.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SecurityAttributes {
    pub rules: Vec<SecurityRule>,
    /// Octets after the last complete rule.
    pub trailing: Vec<u8>,
}

impl SecurityAttributes {
    /// Decodes every complete rule in the value. Never fails.
    pub fn decode(value: &[u8]) -> Self {
        let chunks = value.chunks_exact(RULE_SIZE);
        let trailing = chunks.remainder().to_vec();
        let rules = chunks
            .filter_map(|chunk| <[u8; RULE_SIZE]>::try_from(chunk).ok())
            .map(SecurityRule::decode)
            .collect();

        Self { rules, trailing }
    }
}

impl Display for SecurityAttributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.rules.as_slice() {
            [rule] if self.trailing.is_empty() => {
                write!(f, "{}\n{}", short_hex(&rule.raw), rule)?;
            }
            rules => {
                for rule in rules {
                    write!(f, "Rule: {}", short_hex(&rule.raw))?;
                    for line in rule.to_string().lines() {
                        write!(f, "\n    {}", line)?;
                    }
                    writeln!(f)?;
                }
            }
        }

        if !self.trailing.is_empty() {
            write!(f, "Trailing octets: {}", short_hex(&self.trailing))?;
        }

        Ok(())
    }
}
