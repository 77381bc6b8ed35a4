//! A conversation with one card through one transport.

use std::fmt::{Display, Formatter};

use crate::driver::{Driver, PayloadFormat};
use crate::error::Result;
use crate::frame::{Command, Response};
use crate::registry::Registry;
use crate::tlv::Decoding;
use crate::transport::Transport;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

/// Upper bound of GET RESPONSE round trips for one command.
const MAX_GET_RESPONSE: usize = 16;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Fetch pending response data when the status word announces it.
    pub auto_get_response: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_get_response: true,
        }
    }
}

/// A payload decoded for display.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Payload {
    Tlv(Decoding),
    Text(String),
}

impl Display for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Tlv(decoding) => Display::fmt(decoding, f),
            Payload::Text(text) => f.write_str(text),
        }
    }
}

/// The outcome of one command: what was sent, what came back and what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reply {
    /// The command as transmitted, after the pre-send hook. GET RESPONSE round trips are not
    /// recorded.
    pub command: Command,
    pub response: Response,
    /// The status word explained by the driver's status tables.
    pub status: String,
    pub payload: Option<Payload>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.response.is_ok()
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "> {}", self.command)?;
        if !self.response.payload().is_empty() {
            writeln!(f, "< {}", hex::encode_upper(self.response.payload()))?;
        }
        write!(f, "{}: {}", self.response.status(), self.status)?;
        if let Some(payload) = &self.payload {
            write!(f, "\n{}", payload.to_string().trim_end())?;
        }

        Ok(())
    }
}

/// A card session. The transport is owned exclusively; the driver is shared.
pub struct Session<'d, T: Transport> {
    transport: T,
    driver: &'d Driver,
    options: SessionOptions,
}

impl<'d, T: Transport> Session<'d, T> {
    /// Connects and picks the driver claiming the card's ATR.
    pub fn open(mut transport: T, registry: &'d Registry) -> Result<Self> {
        transport.connect()?;

        let atr = transport.announcement();
        let driver = match registry.select(&atr) {
            Ok(driver) => driver,
            Err(e) => {
                transport.disconnect();
                return Err(e);
            }
        };

        Ok(Self {
            transport,
            driver,
            options: SessionOptions::default(),
        })
    }

    /// Connects and talks in the given dialect regardless of the ATR.
    pub fn with_driver(mut transport: T, driver: &'d Driver) -> Result<Self> {
        transport.connect()?;

        info!("Using driver {}", driver.name);

        Ok(Self {
            transport,
            driver,
            options: SessionOptions::default(),
        })
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn driver(&self) -> &'d Driver {
        self.driver
    }

    pub fn announcement(&self) -> Vec<u8> {
        self.transport.announcement()
    }

    /// Sends one command and explains the reply.
    ///
    /// When the status word announces pending data and the driver knows how to fetch it, the
    /// fetched response is returned in place of the announcement.
    pub fn transceive(&mut self, command: Command) -> Result<Reply> {
        let command = self.driver.prepare(command);
        let mut response = self.exchange(&command)?;

        for _ in 0..MAX_GET_RESPONSE {
            if !self.options.auto_get_response {
                break;
            }

            let fetch = match self.driver.get_response(response.status()) {
                Some(fetch) => self.driver.prepare(fetch),
                None => break,
            };

            debug!("{} announces pending data", response.status());

            response = self.exchange(&fetch)?;
        }

        let status = self.driver.resolve(response.status());

        Ok(Reply {
            command,
            response,
            status,
            payload: None,
        })
    }

    /// Runs the named operation of the driver's command table.
    ///
    /// Frames are sent in order; the first reply that is not a normal ending ends the run.
    pub fn run(&mut self, name: &str, args: &[&str]) -> Result<Vec<Reply>> {
        let operation = *self.driver.operation(name)?;
        let commands = (operation.build)(args)?;

        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            let mut reply = self.transceive(command)?;
            reply.payload = decode_payload(self.driver, operation.format, &reply);

            let stop = !reply.is_ok();
            replies.push(reply);
            if stop {
                info!("{} stopped: {}", name, replies[replies.len() - 1].status);
                break;
            }
        }

        Ok(replies)
    }

    /// Disconnects and hands the transport back.
    pub fn close(mut self) -> T {
        self.transport.disconnect();
        self.transport
    }

    fn exchange(&mut self, command: &Command) -> Result<Response> {
        let tx = command.to_bytes()?;

        debug!("TX: {}", hex::encode(&tx));

        let rx = self.transport.transceive(&tx)?;

        debug!("RX: {}", hex::encode(&rx));

        Ok(Response::from_bytes(rx)?)
    }
}

fn decode_payload(driver: &Driver, format: PayloadFormat, reply: &Reply) -> Option<Payload> {
    let payload = reply.response.payload();
    if payload.is_empty() {
        return None;
    }

    match format {
        PayloadFormat::Raw => None,
        PayloadFormat::Tlv(context) => Some(Payload::Tlv(driver.decode_tlv(payload, context))),
        PayloadFormat::Custom(render) => Some(Payload::Text(render(&reply.command, payload))),
    }
}
