//! Stand-ins for the `tracing` macros, compiled in when the `tracing` feature is off.
//!
//! The module is declared first with `#[macro_use]`, so the macros are in scope everywhere.
//! With the feature on, modules import the real ones with `use tracing::{debug, info};`.

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t: tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($t: tt)*) => {};
}
