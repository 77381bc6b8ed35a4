//! Built-in dialects.
//!
//! | driver      | tiers                | claims an ATR |
//! |-------------|----------------------|---------------|
//! | `ISO7816-4` | ISO                  | no            |
//! | `GSM`       | ISO, GSM             | yes           |
//! | `GRCard`    | ISO, GSM, GRCard     | yes           |
//! | `TCOS`      | ISO, TCOS            | yes           |

use crate::driver::Driver;
use crate::error::Result;

pub mod grcard;
pub mod gsm;
pub mod iso;
pub mod tcos;

/// Every built-in driver in registration order.
pub fn all() -> Result<Vec<Driver>> {
    Ok(vec![
        iso::driver()?,
        gsm::driver()?,
        grcard::driver()?,
        tcos::driver()?,
    ])
}
