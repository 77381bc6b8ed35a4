//! Command and response frames (APDUs) in the short-form wire format.

use std::fmt::{Display, Formatter};

use crate::error::EncodingError;

/// Class byte meaning "use the dialect's own class byte".
/// Drivers replace it in their pre-send hook.
pub const CLA_DEFAULT: u8 = 0x00;

const MAX_SHORT_LENGTH: usize = 0xFF;

/// An APDU command to be transmitted.
///
/// The payload length (Lc) is never stored; it is derived from the payload when serializing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Command {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub payload: Vec<u8>,
    pub le: Option<u8>,
}

/// Fields to replace when deriving a command from a template.
/// `None` keeps the template's value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub cla: Option<u8>,
    pub ins: Option<u8>,
    pub p1: Option<u8>,
    pub p2: Option<u8>,
    pub payload: Option<Vec<u8>>,
    pub le: Option<Option<u8>>,
}

impl Command {
    /// Constructs a command with CLA, INS, P1, and P2.
    /// No payloads will be transmitted or received.
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            payload: Vec::new(),
            le: None,
        }
    }

    /// Constructs a template carrying only an instruction, with the default class byte.
    pub const fn template(ins: u8) -> Self {
        Self::new(CLA_DEFAULT, ins, 0x00, 0x00)
    }

    /// Builds a new command from this template, applying the overrides.
    /// The template itself is left untouched.
    pub fn build(&self, overrides: Overrides) -> Self {
        Self {
            cla: overrides.cla.unwrap_or(self.cla),
            ins: overrides.ins.unwrap_or(self.ins),
            p1: overrides.p1.unwrap_or(self.p1),
            p2: overrides.p2.unwrap_or(self.p2),
            payload: overrides.payload.unwrap_or_else(|| self.payload.clone()),
            le: overrides.le.unwrap_or(self.le),
        }
    }

    pub fn with_cla(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    pub fn with_p1(mut self, p1: u8) -> Self {
        self.p1 = p1;
        self
    }

    pub fn with_p2(mut self, p2: u8) -> Self {
        self.p2 = p2;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Length of the payload as it will appear in the Lc field.
    pub fn lc(&self) -> usize {
        self.payload.len()
    }

    /// Converts the command into octets: header, then Lc and payload if any, then Le if any.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        if self.payload.len() > MAX_SHORT_LENGTH {
            return Err(EncodingError::PayloadTooLong(self.payload.len()));
        }

        let mut buffer: Vec<u8> = vec![self.cla, self.ins, self.p1, self.p2];
        if !self.payload.is_empty() {
            buffer.push(self.payload.len() as u8);
            buffer.extend_from_slice(&self.payload);
        }

        if let Some(l) = self.le {
            buffer.push(l);
        }

        Ok(buffer)
    }

    /// Parses a short-form command, the inverse of [`Command::to_bytes`].
    pub fn parse(bytes: &[u8]) -> Result<Self, EncodingError> {
        let (header, body) = match bytes {
            [cla, ins, p1, p2, body @ ..] => (Self::new(*cla, *ins, *p1, *p2), body),
            _ => return Err(EncodingError::TooShort(bytes.len())),
        };

        match body {
            [] => Ok(header),
            [le] => Ok(header.with_le(*le)),
            [lc, rest @ ..] => {
                let lc = *lc as usize;
                match rest.len() {
                    n if n == lc => Ok(header.with_payload(rest)),
                    n if n == lc + 1 => Ok(header.with_payload(&rest[..lc]).with_le(rest[lc])),
                    n => Err(EncodingError::LengthMismatch {
                        declared: lc,
                        actual: n,
                    }),
                }
            }
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X} {:02X}",
            self.cla, self.ins, self.p1, self.p2
        )?;
        if !self.payload.is_empty() {
            write!(
                f,
                " [{:02X}] {}",
                self.payload.len(),
                hex::encode_upper(&self.payload)
            )?;
        }
        if let Some(le) = self.le {
            write!(f, " Le={:02X}", le)?;
        }

        Ok(())
    }
}

/// The 2-octet completion code trailing every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatusWord(pub u8, pub u8);

impl StatusWord {
    pub const OK: Self = Self(0x90, 0x00);

    pub fn sw1(self) -> u8 {
        self.0
    }

    pub fn sw2(self) -> u8 {
        self.1
    }

    /// Determines whether the status denotes a normal ending, including the variants that
    /// announce more data or proactive commands.
    pub fn is_ok(self) -> bool {
        matches!(self.0, 0x90 | 0x91 | 0x9F | 0x61)
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self(sw1, sw2)
    }
}

impl From<u16> for StatusWord {
    fn from(code: u16) -> Self {
        let [sw1, sw2] = code.to_be_bytes();
        Self(sw1, sw2)
    }
}

impl Display for StatusWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X} {:02X}", self.0, self.1)
    }
}

/// A response that was received from the card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Response {
    payload: Vec<u8>,
    trailer: StatusWord,
}

impl Response {
    /// Parses a response from the octets, the last two being the status word.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self, EncodingError> {
        if bytes.len() < 2 {
            return Err(EncodingError::ResponseTooShort(bytes.len()));
        }

        let sw2 = bytes.pop().unwrap_or_default();
        let sw1 = bytes.pop().unwrap_or_default();

        Ok(Self {
            payload: bytes,
            trailer: StatusWord(sw1, sw2),
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn status(&self) -> StatusWord {
        self.trailer
    }

    /// Determines whether the response indicates success or not.
    pub fn is_ok(&self) -> bool {
        self.trailer.is_ok()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl TryFrom<Vec<u8>> for Response {
    type Error = EncodingError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_layout() {
        let command = Command::new(0xA0, 0x88, 0x00, 0x00)
            .with_payload(vec![0x11, 0x22])
            .with_le(0x0C);

        assert_eq!(
            vec![0xA0, 0x88, 0x00, 0x00, 0x02, 0x11, 0x22, 0x0C],
            command.to_bytes().unwrap()
        );
        assert_eq!(
            vec![0x00, 0xB0, 0x00, 0x10],
            Command::new(0x00, 0xB0, 0x00, 0x10).to_bytes().unwrap()
        );
    }

    #[test]
    fn test_serialize_too_long() {
        let command = Command::template(0xD6).with_payload(vec![0u8; 256]);

        assert_eq!(
            Err(EncodingError::PayloadTooLong(256)),
            command.to_bytes()
        );
        assert!(Command::template(0xD6)
            .with_payload(vec![0u8; 255])
            .to_bytes()
            .is_ok());
    }

    #[test]
    fn test_build_keeps_template() {
        let template = Command::template(0xA4).with_p2(0x0C);
        let built = template.build(Overrides {
            p1: Some(0x04),
            payload: Some(vec![0x3F, 0x00]),
            ..Default::default()
        });

        assert_eq!(Command::template(0xA4).with_p2(0x0C), template);
        assert_eq!(0x04, built.p1);
        assert_eq!(0x0C, built.p2);
        assert_eq!(2, built.lc());
        assert_eq!(None, built.le);
    }

    #[test]
    fn test_build_clears_le() {
        let template = Command::template(0xC0).with_le(0x10);
        let built = template.build(Overrides {
            le: Some(None),
            ..Default::default()
        });

        assert_eq!(None, built.le);
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            Command::new(0x00, 0xC0, 0x00, 0x00).with_le(0x12),
            Command::parse(&[0x00, 0xC0, 0x00, 0x00, 0x12]).unwrap()
        );
        assert_eq!(
            Err(EncodingError::TooShort(3)),
            Command::parse(&[0x00, 0xC0, 0x00])
        );
        assert_eq!(
            Err(EncodingError::LengthMismatch {
                declared: 4,
                actual: 2
            }),
            Command::parse(&[0x00, 0xA4, 0x00, 0x00, 0x04, 0x3F, 0x00])
        );
    }

    #[test]
    fn test_response() {
        let response = Response::from_bytes(vec![0x01, 0x02, 0x98, 0x04]).unwrap();

        assert_eq!(&[0x01, 0x02], response.payload());
        assert_eq!(StatusWord(0x98, 0x04), response.status());
        assert!(!response.is_ok());
        assert!(Response::from_bytes(vec![0x90, 0x00]).unwrap().is_ok());
    }

    #[test]
    fn test_response_without_status_word() {
        assert_eq!(
            Err(EncodingError::ResponseTooShort(1)),
            Response::from_bytes(vec![0x90])
        );
        assert_eq!(
            Err(EncodingError::ResponseTooShort(0)),
            Response::try_from(Vec::new())
        );
    }
}
