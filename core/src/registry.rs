//! The drivers known to the engine and the choice among them.

use crate::driver::Driver;
use crate::drivers;
use crate::error::{Error, Result};

#[cfg(feature = "tracing")]
use tracing::{debug, info};

/// Drivers in registration order. Assembled once, read-only afterwards.
#[derive(Debug, Default)]
pub struct Registry {
    drivers: Vec<Driver>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    /// The registry of every dialect shipped with the crate.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for driver in drivers::all()? {
            registry.register(driver);
        }

        Ok(registry)
    }

    pub fn register(&mut self, driver: Driver) {
        debug!("Registered driver {}", driver.name);

        self.drivers.push(driver);
    }

    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    /// Picks the driver for the ATR.
    ///
    /// Among the drivers with a matching pattern, the one whose matching pattern fixes the most
    /// nibbles wins. Ties go to the driver registered first.
    pub fn select(&self, atr: &[u8]) -> Result<&Driver> {
        let mut best: Option<(usize, &Driver)> = None;
        for driver in &self.drivers {
            if let Some(specificity) = driver.matches(atr) {
                if best.map_or(true, |(s, _)| specificity > s) {
                    best = Some((specificity, driver));
                }
            }
        }

        match best {
            Some((_, driver)) => {
                info!("Selected driver {} for ATR {}", driver.name, hex::encode(atr));
                Ok(driver)
            }
            None => Err(Error::NoDriverFound(atr.to_vec())),
        }
    }

    /// Finds a driver by name, ignoring case.
    pub fn by_name(&self, name: &str) -> Result<&Driver> {
        self.drivers
            .iter()
            .find(|driver| driver.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownDriver(name.to_string()))
    }
}
