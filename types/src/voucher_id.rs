//! Voucher identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a voucher. Assigned by the ledger, monotonically, starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoucherId(u64);

impl VoucherId {
    /// The first id the ledger hands out.
    pub const FIRST: Self = Self(1);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The id following this one, `None` once the id space is exhausted.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for VoucherId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
