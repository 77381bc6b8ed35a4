//! Drivers: everything the engine knows about one card dialect.
//!
//! A driver is plain data assembled once from table [`Fragment`]s, the shared tier first and the
//! dialect's own additions last. Later fragments replace commands and tags of the same name, and
//! their status tables are consulted first.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use crate::atr::AtrPattern;
use crate::error::{Error, Result};
use crate::frame::{Command, StatusWord};
use crate::status::{self, StatusPattern, StatusTable};
use crate::tlv::{self, Context, Decoding, TagSpec, TagTable};

/// Builds the frames of an operation from user-supplied arguments.
/// Arguments are rejected here, before anything reaches the card.
pub type Build = fn(&[&str]) -> Result<Vec<Command>>;

/// Rewrites a command right before it is serialized.
pub type Hook = fn(Command) -> Command;

/// How the payloads of an operation's replies are presented.
#[derive(Clone, Copy)]
pub enum PayloadFormat {
    Raw,
    Tlv(Context),
    Custom(fn(&Command, &[u8]) -> String),
}

/// A named operation of the command table.
#[derive(Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    pub build: Build,
    pub format: PayloadFormat,
}

impl Debug for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

/// Commands, status messages and tags shared by a tier of dialects or added by one of them.
#[derive(Debug)]
pub struct Fragment {
    pub name: &'static str,
    pub operations: &'static [Operation],
    pub status: Option<&'static StatusTable>,
    pub tags: &'static [TagSpec],
}

/// When a status word announces pending response data, the command that fetches it.
#[derive(Debug, Clone)]
pub struct GetResponse {
    pub trigger: StatusPattern,
    /// Le is set to SW2 of the triggering reply.
    pub template: Command,
}

pub struct Driver {
    pub name: &'static str,
    atrs: Vec<AtrPattern>,
    operations: BTreeMap<&'static str, Operation>,
    status: Vec<&'static StatusTable>,
    tags: TagTable,
    before_send: Option<Hook>,
    get_response: Option<GetResponse>,
}

impl Driver {
    pub fn builder(name: &'static str) -> DriverBuilder {
        DriverBuilder {
            name,
            atrs: Vec::new(),
            fragments: Vec::new(),
            before_send: None,
            get_response: None,
        }
    }

    pub fn atrs(&self) -> &[AtrPattern] {
        &self.atrs
    }

    /// The specificity of the most specific pattern matching the ATR, if any does.
    pub fn matches(&self, atr: &[u8]) -> Option<usize> {
        self.atrs
            .iter()
            .filter(|pattern| pattern.matches(atr))
            .map(AtrPattern::specificity)
            .max()
    }

    /// Operations ordered by name.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn operation(&self, name: &str) -> Result<&Operation> {
        self.operations
            .get(name)
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))
    }

    /// Builds the frames of the named operation.
    pub fn build(&self, name: &str, args: &[&str]) -> Result<Vec<Command>> {
        (self.operation(name)?.build)(args)
    }

    /// Runs the pre-send hook on the command.
    pub fn prepare(&self, command: Command) -> Command {
        match self.before_send {
            Some(hook) => hook(command),
            None => command,
        }
    }

    /// Status tables from the dialect's own down to the shared base.
    pub fn status_tables(&self) -> &[&'static StatusTable] {
        &self.status
    }

    pub fn resolve(&self, sw: StatusWord) -> String {
        status::resolve(&self.status, sw)
    }

    pub fn tags(&self) -> &TagTable {
        &self.tags
    }

    pub fn decode_tlv(&self, bytes: &[u8], context: Context) -> Decoding {
        tlv::decode(bytes, context, &self.tags)
    }

    /// The GET RESPONSE command to issue after the status word, if it announces pending data.
    pub fn get_response(&self, sw: StatusWord) -> Option<Command> {
        self.get_response
            .as_ref()
            .filter(|gr| gr.trigger.matches(sw))
            .map(|gr| gr.template.clone().with_le(sw.sw2()))
    }
}

impl Debug for Driver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.name)
            .field("atrs", &self.atrs)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .field(
                "status",
                &self.status.iter().map(|t| t.name).collect::<Vec<_>>(),
            )
            .field("tags", &self.tags.len())
            .field("before_send", &self.before_send.is_some())
            .field("get_response", &self.get_response)
            .finish()
    }
}

pub struct DriverBuilder {
    name: &'static str,
    atrs: Vec<&'static str>,
    fragments: Vec<&'static Fragment>,
    before_send: Option<Hook>,
    get_response: Option<GetResponse>,
}

impl DriverBuilder {
    /// Claims ATRs matching the hex pattern.
    pub fn atr(mut self, pattern: &'static str) -> Self {
        self.atrs.push(pattern);
        self
    }

    /// Adds a fragment on top of the ones added before.
    pub fn fragment(mut self, fragment: &'static Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn before_send(mut self, hook: Hook) -> Self {
        self.before_send = Some(hook);
        self
    }

    /// Fetches pending data with the template whenever a status word matches `trigger`.
    ///
    /// Panics if `trigger` is not a 4-nibble status pattern such as `9F??`.
    pub fn get_response(mut self, trigger: &str, template: Command) -> Self {
        self.get_response = Some(GetResponse {
            trigger: StatusPattern::new(trigger),
            template,
        });
        self
    }

    pub fn build(self) -> Result<Driver> {
        let atrs = self
            .atrs
            .iter()
            .map(|pattern| pattern.parse())
            .collect::<std::result::Result<Vec<AtrPattern>, _>>()
            .map_err(|source| Error::InvalidAtrPattern {
                driver: self.name,
                source,
            })?;

        let mut operations = BTreeMap::new();
        let mut tags = TagTable::new();
        for fragment in &self.fragments {
            operations.extend(fragment.operations.iter().map(|op| (op.name, *op)));
            tags.merge(fragment.tags);
        }

        let status = self
            .fragments
            .iter()
            .rev()
            .filter_map(|fragment| fragment.status)
            .collect();

        Ok(Driver {
            name: self.name,
            atrs,
            operations,
            status,
            tags,
            before_send: self.before_send,
            get_response: self.get_response,
        })
    }
}

/// Parses hex given as one or more arguments, ignoring whitespace between digits.
pub fn hex_argument(command: &'static str, args: &[&str]) -> Result<Vec<u8>> {
    let digits: String = args.iter().flat_map(|arg| arg.split_whitespace()).collect();

    hex::decode(&digits).map_err(|e| Error::InvalidArgument {
        command,
        reason: format!("{:?} is not hex: {}", digits, e),
    })
}

/// Parses a number given in decimal or with a `0x` prefix.
pub fn number_argument<N: TryFrom<u32>>(command: &'static str, arg: &str) -> Result<N> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => arg.parse(),
    };

    parsed
        .ok()
        .and_then(|n| N::try_from(n).ok())
        .ok_or_else(|| Error::InvalidArgument {
            command,
            reason: format!("{:?} is out of range", arg),
        })
}

pub fn byte_argument(command: &'static str, arg: &str) -> Result<u8> {
    number_argument(command, arg)
}

/// Fails unless exactly `count` arguments are given.
pub fn expect_args(command: &'static str, args: &[&str], count: usize) -> Result<()> {
    match args.len() == count {
        true => Ok(()),
        _ => Err(Error::InvalidArgument {
            command,
            reason: format!("expected {} argument(s), got {}", count, args.len()),
        }),
    }
}
