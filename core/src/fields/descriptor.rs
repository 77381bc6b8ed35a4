//! File descriptor extension: status, internal file type and verification failure counter.
//!
//! Layout of the value:
//!
//! | octets | content                                                       |
//! |--------|---------------------------------------------------------------|
//! | 1      | file status                                                   |
//! | 1..=3  | internal file type (1 for data, 2 for passwords, 3 for keys)  |
//! | 2      | verification failure counter, current and reset value         |

use std::fmt::{Display, Formatter};

use super::{short_hex, BitLine, BitRow, BitTable};

static FILE_STATUS: BitTable = BitTable {
    rows: &[
        BitRow::is(0xF9, 0x01, "Not invalidated"),
        BitRow::is(0xF9, 0x00, "Invalidated"),
        BitRow::is(0xFC, 0x04, "Not permanent"),
        BitRow::is(0xFC, 0x00, "Permanent"),
        BitRow::is_not(0xF2, 0x00, "RFU"),
    ],
    fallback: "Undefined file status",
};

static DATA_FILE_TYPE: BitTable = BitTable {
    rows: &[
        BitRow::is(0x83, 0x00, "General data file"),
        BitRow::is(0x83, 0x01, "System file EF_ATR"),
        BitRow::is(0x83, 0x02, "System file EF_GDO"),
        BitRow::is(0x83, 0x03, "System file EF_SIGLimit"),
        BitRow::is_not(0x7C, 0x00, "RFU"),
    ],
    fallback: "Undefined data file type",
};

static KEY_PURPOSE: BitTable = BitTable {
    rows: &[
        BitRow::is(0x08, 0x08, "Signature"),
        BitRow::is(0x04, 0x04, "Encryption"),
        BitRow::is(0x02, 0x02, "MAC"),
        BitRow::is(0x01, 0x01, "Authenticate"),
        BitRow::is_not(0x30, 0x00, "RFU"),
    ],
    fallback: "No purpose (RFU)",
};

static SECRET_FILE_TYPE: BitTable = BitTable {
    rows: &[
        BitRow::is(0xC0, 0x80, "Password file"),
        BitRow::is(0xC0, 0xC0, "Key file").then(&KEY_PURPOSE),
    ],
    fallback: "Undefined secret file type",
};

static FILE_TYPE: BitTable = BitTable {
    rows: &[
        BitRow::is(0x80, 0x00, "Data file").then(&DATA_FILE_TYPE),
        BitRow::is(0x80, 0x80, "Secret file").then(&SECRET_FILE_TYPE),
    ],
    fallback: "Undefined file type",
};

static SYMMETRIC_ALGORITHM: BitTable = BitTable {
    rows: &[
        BitRow::is(0x1C, 0x00, "RFU"),
        BitRow::is(0x1C, 0x04, "IDEA"),
        BitRow::is(0x1C, 0x08, "DES"),
        BitRow::is(0x1C, 0x0C, "DES3"),
    ],
    fallback: "Undefined symmetric algorithm",
};

static ASYMMETRIC_ALGORITHM: BitTable = BitTable {
    rows: &[
        BitRow::is(0x9C, 0x10, "RSA, public key"),
        BitRow::is(0x9C, 0x90, "RSA, private key"),
    ],
    fallback: "Undefined asymmetric algorithm",
};

static ALGORITHM: BitTable = BitTable {
    rows: &[
        BitRow::is(0x10, 0x00, "Symmetric algorithm").then(&SYMMETRIC_ALGORITHM),
        BitRow::is(0x10, 0x10, "Asymmetric algorithm").then(&ASYMMETRIC_ALGORITHM),
        BitRow::is_not(0x63, 0x00, "RFU"),
    ],
    fallback: "Undefined algorithm",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DataFileKind {
    General,
    Atr,
    Gdo,
    SigLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum KeyPurpose {
    Signature,
    Encryption,
    Mac,
    Authenticate,
}

impl Display for KeyPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            KeyPurpose::Signature => "signature",
            KeyPurpose::Encryption => "encryption",
            KeyPurpose::Mac => "mac",
            KeyPurpose::Authenticate => "authenticate",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FileCategory {
    Data(DataFileKind),
    Password,
    Key(Vec<KeyPurpose>),
}

impl FileCategory {
    fn from_octet(octet: u8) -> Self {
        match octet & 0xC0 {
            0xC0 => Self::Key(
                [
                    (0x08u8, KeyPurpose::Signature),
                    (0x04, KeyPurpose::Encryption),
                    (0x02, KeyPurpose::Mac),
                    (0x01, KeyPurpose::Authenticate),
                ]
                .into_iter()
                .filter(|(bit, _)| octet & bit != 0)
                .map(|(_, purpose)| purpose)
                .collect(),
            ),
            0x80 => Self::Password,
            _ => Self::Data(match octet & 0x03 {
                0x00 => DataFileKind::General,
                0x01 => DataFileKind::Atr,
                0x02 => DataFileKind::Gdo,
                _ => DataFileKind::SigLimit,
            }),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FileCategory::Data(_) => "data",
            FileCategory::Password => "password",
            FileCategory::Key(_) => "key",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Algorithm {
    Idea,
    Des,
    Des3,
    RsaPublic,
    RsaPrivate,
    Reserved,
}

impl Algorithm {
    fn from_octet(octet: u8) -> Self {
        match (octet & 0x10, octet & 0x9C) {
            (0x00, _) => match octet & 0x1C {
                0x04 => Self::Idea,
                0x08 => Self::Des,
                0x0C => Self::Des3,
                _ => Self::Reserved,
            },
            (_, 0x10) => Self::RsaPublic,
            (_, 0x90) => Self::RsaPrivate,
            _ => Self::Reserved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileStatus {
    pub octet: u8,
    pub invalidated: bool,
    pub permanent: bool,
    pub lines: Vec<BitLine>,
}

impl FileStatus {
    pub fn decode(octet: u8) -> Self {
        Self {
            octet,
            invalidated: octet & 0x01 == 0,
            permanent: octet & 0x04 == 0,
            lines: FILE_STATUS.evaluate(octet),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileType {
    pub octets: Vec<u8>,
    pub category: FileCategory,
    pub lines: Vec<BitLine>,
    /// Number of the secret, for password and key files.
    pub secret_number: Option<u8>,
    /// Cryptographic algorithm, for key files.
    pub algorithm: Option<(Algorithm, Vec<BitLine>)>,
}

impl FileType {
    /// Decodes the internal file type descriptor; `octets` must not be empty.
    fn decode(octets: &[u8]) -> Self {
        let first = octets.first().copied().unwrap_or_default();

        Self {
            octets: octets.to_vec(),
            category: FileCategory::from_octet(first),
            lines: FILE_TYPE.evaluate(first),
            secret_number: octets.get(1).map(|o| o & 0x1F),
            algorithm: octets
                .get(2)
                .map(|o| (Algorithm::from_octet(*o), ALGORITHM.evaluate(*o))),
        }
    }

    /// Number of octets the type descriptor occupies, judging by its first octet.
    fn width(first: u8) -> usize {
        match first & 0xC0 {
            0xC0 => 3,
            0x80 => 2,
            _ => 1,
        }
    }
}

/// How the failure counter of a secret gets reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ResetPolicy {
    Unused,
    /// With the unblock password, or by a successful verification.
    UnblockOrVerification,
    /// Only with the unblock password.
    UnblockOnly,
}

/// Verification failure counter (FBZ).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FailureCounter {
    pub current: u8,
    /// The reset octet as stored, policy bit included.
    pub reset: u8,
    pub reset_value: u8,
    pub policy: ResetPolicy,
}

impl FailureCounter {
    pub fn decode(current: u8, reset: u8) -> Self {
        Self {
            current,
            reset,
            reset_value: reset & 0x7F,
            policy: match reset {
                0x00 => ResetPolicy::Unused,
                r if r & 0x80 == 0 => ResetPolicy::UnblockOrVerification,
                _ => ResetPolicy::UnblockOnly,
            },
        }
    }

    pub fn is_unused(&self) -> bool {
        self.current == 0 && self.policy == ResetPolicy::Unused
    }

    /// No attempts left while a reset is possible.
    pub fn is_locked(&self) -> bool {
        self.current == 0 && self.policy != ResetPolicy::Unused
    }
}

impl Display for FailureCounter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_unused() {
            return write!(f, "FBZ unused");
        }

        write!(f, "Current value: {} (0x{:x})", self.current, self.current)?;
        if self.is_locked() {
            write!(f, " (Secret locked)")?;
        }
        write!(
            f,
            "\nReset value: {} (0x{:x}) ({})",
            self.reset_value,
            self.reset_value,
            match self.policy {
                ResetPolicy::Unused => "FBZ unused",
                ResetPolicy::UnblockOrVerification =>
                    "reset with unblock password and successful verification",
                ResetPolicy::UnblockOnly => "reset only with unblock password",
            }
        )
    }
}

/// Everything the file descriptor extension tells about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileDescriptor {
    pub raw: Vec<u8>,
    pub status: Option<FileStatus>,
    pub file_type: Option<FileType>,
    pub failure_counter: Option<FailureCounter>,
    /// Octets after the type descriptor that do not form a failure counter.
    pub trailing: Vec<u8>,
}

impl FileDescriptor {
    /// Decodes as much of the value as is present. Never fails.
    pub fn decode(value: &[u8]) -> Self {
        let status = value.first().map(|o| FileStatus::decode(*o));

        let rest = value.get(1..).unwrap_or_default();
        let (file_type, rest) = match rest.first() {
            Some(first) => {
                let (octets, rest) = rest.split_at(FileType::width(*first).min(rest.len()));
                (Some(FileType::decode(octets)), rest)
            }
            None => (None, rest),
        };

        let (failure_counter, trailing) = match rest {
            [current, reset] => (Some(FailureCounter::decode(*current, *reset)), Vec::new()),
            _ => (None, rest.to_vec()),
        };

        Self {
            raw: value.to_vec(),
            status,
            file_type,
            failure_counter,
            trailing,
        }
    }

    /// One-line summary such as `category: key, purpose: authenticate, status: not invalidated`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(file_type) = &self.file_type {
            parts.push(format!("category: {}", file_type.category.name()));
            if let FileCategory::Key(purposes) = &file_type.category {
                let purposes = purposes.iter().map(|p| p.to_string()).collect::<Vec<_>>();
                parts.push(format!("purpose: {}", purposes.join("/")));
            }
        }

        if let Some(status) = &self.status {
            parts.push(format!(
                "status: {}",
                match status.invalidated {
                    true => "invalidated",
                    _ => "not invalidated",
                }
            ));
        }

        parts.join(", ")
    }
}

impl Display for FileDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", short_hex(&self.raw))?;

        if let Some(status) = &self.status {
            write!(f, "\nFile status: {:02X}", status.octet)?;
            for line in &status.lines {
                write!(f, "\n    {}", line)?;
            }
        }

        if let Some(file_type) = &self.file_type {
            write!(
                f,
                "\nInternal file type descriptor: {}",
                short_hex(&file_type.octets)
            )?;
            write!(f, "\n    File type: {:02X}", file_type.octets[0])?;
            for line in &file_type.lines {
                write!(f, "\n        {}", line)?;
            }
            if let Some(number) = file_type.secret_number {
                write!(f, "\n    Number of secret: {} (0x{:x})", number, number)?;
            }
            if let Some((_, lines)) = &file_type.algorithm {
                write!(
                    f,
                    "\n    Cryptographic algorithm: {:02X}",
                    file_type.octets[2]
                )?;
                for line in lines {
                    write!(f, "\n        {}", line)?;
                }
            }
        }

        if let Some(counter) = &self.failure_counter {
            write!(
                f,
                "\n    Verification failure counter (FBZ): {:02X} {:02X}",
                counter.current, counter.reset
            )?;
            for line in counter.to_string().lines() {
                write!(f, "\n        {}", line)?;
            }
        }

        if !self.trailing.is_empty() {
            write!(f, "\nTrailing octets: {}", short_hex(&self.trailing))?;
        }

        Ok(())
    }
}
