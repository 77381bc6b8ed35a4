//! Errors raised by the engine.
//!
//! Card-level failures are not errors here: a status word such as `98 04` is an ordinary outcome
//! and travels inside a [`crate::Reply`] as resolved text.

use crate::atr::AtrPatternError;
use crate::transport::TransportError;

/// A frame could not be encoded to, or parsed from, the short-form wire format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("Payload of {0} octets does not fit into a short-form frame")]
    PayloadTooLong(usize),

    #[error("Frame of {0} octets is shorter than a command header")]
    TooShort(usize),

    #[error("Frame declares {declared} payload octets but {actual} follow the header")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Reply of {0} octets has no room for a status word")]
    ResponseTooShort(usize),
}

/// What went wrong while walking a TLV stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TlvFault {
    /// The stream ended inside a tag.
    TruncatedTag,
    /// The stream ended inside a length field.
    TruncatedLength,
    /// Indefinite or wider-than-32-bit length field.
    UnsupportedLength,
    /// The declared length runs past the end of the enclosing buffer.
    TruncatedValue { declared: usize, available: usize },
    /// Constructed objects nested deeper than [`crate::tlv::MAX_DEPTH`] levels.
    TooDeep,
}

/// A TLV stream could not be decoded past `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("Malformed TLV at offset {offset}: {fault:?}")]
pub struct MalformedTlv {
    pub offset: usize,
    pub fault: TlvFault,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No driver matches the ATR {}", hex::encode_upper(.0))]
    NoDriverFound(Vec<u8>),

    #[error("Error occurred while communicating with the reader: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    MalformedTlv(#[from] MalformedTlv),

    #[error("Invalid argument for {command}: {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: String,
    },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    #[error("Driver {driver} declares a bad ATR pattern: {source}")]
    InvalidAtrPattern {
        driver: &'static str,
        source: AtrPatternError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
