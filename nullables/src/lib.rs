//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the ledger (clock, funding reserve) sits
//! behind a trait. This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what they were asked to do
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod reserve;

pub use clock::NullClock;
pub use reserve::{NullReserve, ReserveCall};
