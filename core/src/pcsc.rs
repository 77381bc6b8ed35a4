//! PC/SC transport.
//! Can be enabled by turning `pcsc` feature on.
//!
//! PC/SC (Personal Computer/Smart Card) lets applications talk to any reader with a PC/SC driver.
//! Windows and macOS ship it, Linux needs the pcsc-lite shared library.
//! The backend is pcsc-rust, see <https://github.com/bluetech/pcsc-rust>.
//!
//! ## Usage
//! ```rust,no_run
//! use cardshell::pcsc::{PcscReader, ReaderOptions};
//! use cardshell::{Registry, Session};
//!
//! let reader = PcscReader::open(ReaderOptions::default()).unwrap();
//! let registry = Registry::builtin().unwrap();
//! let session = Session::open(reader, &registry).unwrap();
//!
//! println!("{}", session.driver().name);
//! ```

use std::ffi::CString;
use std::thread::sleep;
use std::time::{Duration, Instant};

use pcsc::{Attribute, Card, Disposition, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::transport::{Transport, TransportError};

#[cfg(feature = "tracing")]
use tracing::{debug, info};

impl From<pcsc::Error> for TransportError {
    fn from(e: pcsc::Error) -> Self {
        match e {
            pcsc::Error::NoReadersAvailable | pcsc::Error::UnknownReader => {
                TransportError::NoReader
            }
            pcsc::Error::NoSmartcard => TransportError::NoCard,
            pcsc::Error::RemovedCard | pcsc::Error::ResetCard => TransportError::Disconnected,
            pcsc::Error::Timeout => TransportError::Timeout,
            _ => TransportError::Backend(e.to_string()),
        }
    }
}

/// How to find the reader and how long to wait for a card.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Use the first reader whose name starts with this; the first reader if `None`.
    pub reader: Option<String>,
    pub poll_interval: Duration,
    /// Give up waiting for a card after this long; wait forever if `None`.
    pub timeout: Option<Duration>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            reader: None,
            poll_interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Names of the readers known to the PC/SC service.
pub fn list_readers() -> Result<Vec<String>, TransportError> {
    let ctx = pcsc::Context::establish(Scope::User)?;

    Ok(ctx
        .list_readers_owned()?
        .into_iter()
        .map(|name| name.to_string_lossy().into_owned())
        .collect())
}

/// A reader reached through PC/SC.
pub struct PcscReader {
    ctx: pcsc::Context,
    reader: CString,
    options: ReaderOptions,
    card: Option<Card>,
    atr: Vec<u8>,
}

impl PcscReader {
    /// Establishes a PC/SC context in user scope and picks the reader.
    pub fn open(options: ReaderOptions) -> Result<Self, TransportError> {
        let ctx = pcsc::Context::establish(Scope::User)?;
        let reader = ctx
            .list_readers_owned()?
            .into_iter()
            .find(|name| match &options.reader {
                Some(prefix) => name.to_string_lossy().starts_with(prefix.as_str()),
                None => true,
            })
            .ok_or(TransportError::NoReader)?;

        info!("Using reader: {}", reader.to_string_lossy());

        Ok(Self {
            ctx,
            reader,
            options,
            card: None,
            atr: Vec::new(),
        })
    }

    pub fn name(&self) -> String {
        self.reader.to_string_lossy().into_owned()
    }
}

impl Transport for PcscReader {
    fn connect(&mut self) -> Result<(), TransportError> {
        // Polls for the card until it is inserted.
        debug!("Waiting for a card");

        let started = Instant::now();
        let card = loop {
            match self
                .ctx
                .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
            {
                Ok(card) => break card,
                Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                    if let Some(timeout) = self.options.timeout {
                        if started.elapsed() >= timeout {
                            return Err(TransportError::Timeout);
                        }
                    }

                    info!("Still waiting for your card...");
                    sleep(self.options.poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.atr = card.get_attribute_owned(Attribute::AtrString)?;
        self.card = Some(card);

        info!("Connected to your card, ATR: {}", hex::encode(&self.atr));

        Ok(())
    }

    fn announcement(&self) -> Vec<u8> {
        self.atr.clone()
    }

    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let card = self.card.as_ref().ok_or(TransportError::Disconnected)?;

        let mut rx = [0u8; MAX_BUFFER_SIZE];
        let rx = card.transmit(command, &mut rx)?;

        Ok(Vec::from(rx))
    }

    fn disconnect(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
                debug!("Disconnecting failed: {}", e);
            }
        }

        self.atr.clear();
    }
}

impl Drop for PcscReader {
    fn drop(&mut self) {
        self.disconnect();
    }
}
