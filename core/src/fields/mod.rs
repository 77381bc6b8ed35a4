//! Decoders for fixed-format bit fields found in file control parameters.
//!
//! A [`BitTable`] is evaluated row by row against one octet. A row fires when the masked octet
//! equals (or, for [`BitRow::is_not`], differs from) the expected value, emitting its text and
//! descending into its sub-table if it has one. Every table has a fallback text emitted when no
//! row fired, so evaluation is total over all 256 octet values.

use std::fmt::{Display, Formatter};

pub mod descriptor;
pub mod security;

/// One row of a [`BitTable`].
#[derive(Debug, Clone, Copy)]
pub struct BitRow {
    pub mask: u8,
    pub value: u8,
    pub negate: bool,
    pub text: &'static str,
    pub sub: Option<&'static BitTable>,
}

impl BitRow {
    /// Fires when `octet & mask == value`.
    pub const fn is(mask: u8, value: u8, text: &'static str) -> Self {
        Self {
            mask,
            value,
            negate: false,
            text,
            sub: None,
        }
    }

    /// Fires when `octet & mask != value`.
    pub const fn is_not(mask: u8, value: u8, text: &'static str) -> Self {
        Self {
            mask,
            value,
            negate: true,
            text,
            sub: None,
        }
    }

    /// Evaluates the sub-table for finer bits once this row fired.
    pub const fn then(mut self, sub: &'static BitTable) -> Self {
        self.sub = Some(sub);
        self
    }

    fn fires(&self, octet: u8) -> bool {
        (octet & self.mask == self.value) != self.negate
    }
}

#[derive(Debug)]
pub struct BitTable {
    pub rows: &'static [BitRow],
    pub fallback: &'static str,
}

/// One fired row: the bits it looked at, its text and how deep in the sub-tables it sits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BitLine {
    pub bits: String,
    pub text: &'static str,
    pub depth: usize,
}

impl Display for BitLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} {}", "  ".repeat(self.depth), self.bits, self.text)
    }
}

impl BitTable {
    /// Evaluates the table against the octet. Never returns an empty list.
    pub fn evaluate(&self, octet: u8) -> Vec<BitLine> {
        let mut lines = Vec::new();
        self.evaluate_into(octet, 0, &mut lines);
        lines
    }

    fn evaluate_into(&self, octet: u8, depth: usize, lines: &mut Vec<BitLine>) {
        let before = lines.len();

        for row in self.rows.iter().filter(|row| row.fires(octet)) {
            lines.push(BitLine {
                bits: bits(row.mask, octet),
                text: row.text,
                depth,
            });
            if let Some(sub) = row.sub {
                sub.evaluate_into(octet, depth + 1, lines);
            }
        }

        if lines.len() == before {
            lines.push(BitLine {
                bits: bits(0xFF, octet),
                text: self.fallback,
                depth,
            });
        }
    }
}

/// Renders the masked bits of the octet, e.g. `1.......` for mask `80`.
pub fn bits(mask: u8, octet: u8) -> String {
    (0..8)
        .rev()
        .map(|i| match (mask >> i) & 1 {
            0 => '.',
            _ => match (octet >> i) & 1 {
                0 => '0',
                _ => '1',
            },
        })
        .collect()
}

/// Renders bytes the short way, `01 C1 08`.
pub(crate) fn short_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
