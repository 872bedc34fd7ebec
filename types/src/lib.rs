//! Fundamental types for the Claw voucher ledger.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! addresses, amounts, timestamps and the clock, voucher ids, and ledger parameters.

pub mod address;
pub mod amount;
pub mod params;
pub mod time;
pub mod voucher_id;

pub use address::{Address, AddressParseError};
pub use amount::{Amount, AmountParseError, DECIMALS, UNIT};
pub use params::LedgerParams;
pub use time::{Clock, SystemClock, Timestamp};
pub use voucher_id::VoucherId;
