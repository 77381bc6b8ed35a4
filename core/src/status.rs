//! Explaining status words.
//!
//! A [`StatusTable`] maps code patterns to messages. Patterns are 4 hex digits where `?` (or `.`)
//! stands for any nibble, e.g. `9F??` or `63C?`. Entries are tried in order and the first match
//! wins, so exact codes go before the wildcards that cover them.

use std::fmt::{Debug, Formatter};

use crate::frame::StatusWord;

/// A status word pattern with nibble wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusPattern {
    value: u16,
    mask: u16,
}

impl StatusPattern {
    /// Parses a pattern like `9F??` at compile time.
    pub const fn new(pattern: &str) -> Self {
        let bytes = pattern.as_bytes();
        assert!(bytes.len() == 4, "status pattern must have 4 nibbles");

        let mut value = 0u16;
        let mut mask = 0u16;
        let mut i = 0;
        while i < 4 {
            let shift = ((3 - i) * 4) as u32;
            let digit = match bytes[i] {
                b'?' | b'.' => None,
                c @ b'0'..=b'9' => Some(c - b'0'),
                c @ b'a'..=b'f' => Some(c - b'a' + 10),
                c @ b'A'..=b'F' => Some(c - b'A' + 10),
                _ => panic!("invalid character in status pattern"),
            };
            if let Some(d) = digit {
                value |= (d as u16) << shift;
                mask |= 0xF << shift;
            }
            i += 1;
        }

        Self { value, mask }
    }

    pub fn matches(&self, sw: StatusWord) -> bool {
        u16::from_be_bytes([sw.0, sw.1]) & self.mask == self.value
    }
}

/// A message for a status word: fixed text, or text computed from the actual bytes.
#[derive(Clone, Copy)]
pub enum Message {
    Text(&'static str),
    Computed(fn(u8, u8) -> String),
}

impl Message {
    pub fn render(&self, sw: StatusWord) -> String {
        match self {
            Message::Text(text) => text.to_string(),
            Message::Computed(f) => f(sw.0, sw.1),
        }
    }
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Message::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusEntry {
    pub pattern: StatusPattern,
    pub message: Message,
}

impl StatusEntry {
    pub const fn text(pattern: &str, text: &'static str) -> Self {
        Self {
            pattern: StatusPattern::new(pattern),
            message: Message::Text(text),
        }
    }

    pub const fn computed(pattern: &str, f: fn(u8, u8) -> String) -> Self {
        Self {
            pattern: StatusPattern::new(pattern),
            message: Message::Computed(f),
        }
    }
}

/// An ordered list of status messages belonging to one dialect or tier.
#[derive(Debug)]
pub struct StatusTable {
    pub name: &'static str,
    pub entries: &'static [StatusEntry],
}

impl StatusTable {
    pub fn lookup(&self, sw: StatusWord) -> Option<String> {
        self.entries
            .iter()
            .find(|entry| entry.pattern.matches(sw))
            .map(|entry| entry.message.render(sw))
    }
}

/// Explains the status word, consulting the tables from the most specific to the least.
/// Falls back to a generic text that still shows the code.
pub fn resolve(stack: &[&StatusTable], sw: StatusWord) -> String {
    lookup(stack, sw).unwrap_or_else(|| format!("No message known for status word {}", sw))
}

/// Like [`resolve`] without the generic fallback.
pub fn lookup(stack: &[&StatusTable], sw: StatusWord) -> Option<String> {
    stack.iter().find_map(|table| table.lookup(sw))
}
