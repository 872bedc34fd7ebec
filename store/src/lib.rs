//! Collaborator traits for the Claw voucher ledger.
//!
//! The ledger owns voucher records only. Custody of the pooled asset lives
//! behind [`FundingReserve`] and the current holder of each voucher lives
//! behind [`OwnershipRegistry`]. The rest of the codebase depends only on the
//! traits; [`memory`] provides the in-process backends.

pub mod error;
pub mod memory;
pub mod ownership;
pub mod reserve;

pub use error::{OwnershipError, ReserveError};
pub use memory::{MemoryOwnership, MemoryReserve, OwnershipState, ReserveState};
pub use ownership::OwnershipRegistry;
pub use reserve::FundingReserve;
