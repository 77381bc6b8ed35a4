//! A crate to identify smart cards and talk to them in their own dialect.
//!
//! The card announces itself with an ATR, the [`Registry`] picks the [`Driver`] claiming that ATR,
//! and a [`Session`] sends the driver's command frames through any [`Transport`].
//! Replies come back with their status word explained and, where the payload is structured,
//! decoded into a TLV tree.

#[macro_use]
mod trace;

#[cfg(feature = "pcsc")]
pub mod pcsc;

pub mod atr;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod fields;
pub mod frame;
pub mod registry;
pub mod session;
pub mod status;
pub mod tlv;
pub mod transport;

pub use driver::Driver;
pub use error::{Error, Result};
pub use frame::{Command, Response, StatusWord};
pub use registry::Registry;
pub use session::{Reply, Session, SessionOptions};
pub use transport::{Transport, TransportError};
