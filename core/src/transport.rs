//! The reader side of a session.
//!
//! A [`Transport`] moves raw frames to the card and back. The engine never pipelines: every call to
//! [`Transport::transceive`] is one complete request and response.

/// Failures reported by a transport. They are surfaced to the caller as-is and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Reader not found")]
    NoReader,

    #[error("No card is present in the reader")]
    NoCard,

    #[error("Timed out waiting for the card")]
    Timeout,

    #[error("The card was disconnected")]
    Disconnected,

    #[error("Reader backend failed: {0}")]
    Backend(String),
}

/// A handle to a reader that exchanges byte blobs with the inserted card.
pub trait Transport {
    /// Connects to the card, waiting for it if the transport supports that.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// The ATR the card announced while connecting. Empty before [`Transport::connect`].
    fn announcement(&self) -> Vec<u8>;

    /// Sends one command frame and returns the response, status word included.
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Releases the card. Calling it on a disconnected transport does nothing.
    fn disconnect(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn announcement(&self) -> Vec<u8> {
        (**self).announcement()
    }

    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).transceive(command)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
