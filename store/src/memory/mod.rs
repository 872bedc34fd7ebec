//! In-process backends for the collaborator traits.
//!
//! Both are thread-safe and can export their state as a serde value so the
//! CLI can persist it between runs.

mod ownership;
mod reserve;

pub use ownership::{MemoryOwnership, OwnershipState};
pub use reserve::{MemoryReserve, ReserveState};
