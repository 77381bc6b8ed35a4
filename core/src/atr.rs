//! ATR (Answer To Reset) patterns a driver claims.
//!
//! Patterns are written in hex; `.` or `?` in place of a hex digit matches any nibble,
//! so `3bba96..` accepts any fourth byte. Whitespace is ignored.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtrPatternError {
    #[error("Invalid character {0:?} in ATR pattern")]
    InvalidCharacter(char),

    #[error("ATR pattern has an odd number of nibbles")]
    OddLength,
}

/// An ordered sequence of byte matchers, each fixing all, half or none of a byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtrPattern {
    value: Vec<u8>,
    mask: Vec<u8>,
}

impl AtrPattern {
    /// Creates a pattern from expected bytes and the mask of the bits that have to match.
    /// Bits outside the mask are ignored in `value`.
    pub fn with_mask(value: &[u8], mask: &[u8]) -> Self {
        let mask = mask.to_vec();
        let value = value.iter().zip(&mask).map(|(v, m)| v & m).collect();

        Self { value, mask }
    }

    /// Creates a pattern matching exactly the given bytes.
    pub fn exact(value: &[u8]) -> Self {
        Self {
            value: value.to_vec(),
            mask: vec![0xFF; value.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Matches iff the lengths are equal and every fixed nibble equals the observed one.
    pub fn matches(&self, atr: &[u8]) -> bool {
        atr.len() == self.value.len()
            && atr
                .iter()
                .zip(self.value.iter().zip(&self.mask))
                .all(|(a, (v, m))| a & m == *v)
    }

    /// Number of fixed nibbles; the higher, the more specific the pattern is.
    pub fn specificity(&self) -> usize {
        self.mask
            .iter()
            .map(|m| (m & 0xF0 != 0) as usize + (m & 0x0F != 0) as usize)
            .sum()
    }
}

impl FromStr for AtrPattern {
    type Err = AtrPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nibbles = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '.' | '?' => Ok(None),
                _ => c
                    .to_digit(16)
                    .map(|d| Some(d as u8))
                    .ok_or(AtrPatternError::InvalidCharacter(c)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if nibbles.len() % 2 != 0 {
            return Err(AtrPatternError::OddLength);
        }

        let (value, mask) = nibbles
            .chunks(2)
            .map(|pair| {
                let (hi, hi_mask) = pair[0].map_or((0, 0), |n| (n << 4, 0xF0));
                let (lo, lo_mask) = pair[1].map_or((0, 0), |n| (n, 0x0F));
                (hi | lo, hi_mask | lo_mask)
            })
            .unzip();

        Ok(Self { value, mask })
    }
}

impl Display for AtrPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (v, m) in self.value.iter().zip(&self.mask) {
            for (shift, nibble_mask) in [(4, 0xF0u8), (0, 0x0F)] {
                match m & nibble_mask {
                    0 => write!(f, ".")?,
                    _ => write!(f, "{:x}", (v & nibble_mask) >> shift)?,
                }
            }
        }

        Ok(())
    }
}
