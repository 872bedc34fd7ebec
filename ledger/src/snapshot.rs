//! Ledger snapshots: every live voucher plus the id counter.
//!
//! The snapshot hash is computed deterministically from the records so a
//! corrupted or hand-edited state file is caught on load.

use std::collections::HashSet;

use claw_types::{Timestamp, VoucherId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::voucher::Voucher;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot encoding error: {0}")]
    Encoding(String),

    #[error("unsupported snapshot version {0} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("snapshot hash does not match its contents")]
    HashMismatch,

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Point-in-time capture of a voucher ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Blake2b-256 over the version, id counter and records.
    pub hash: [u8; 32],
    pub version: u32,
    pub created_at: Timestamp,
    /// Next id the ledger will hand out.
    pub next_id: VoucherId,
    /// Live vouchers, ascending by id.
    pub vouchers: Vec<Voucher>,
}

impl LedgerSnapshot {
    pub fn create(mut vouchers: Vec<Voucher>, next_id: VoucherId, created_at: Timestamp) -> Self {
        vouchers.sort_by_key(Voucher::id);
        let mut snap = Self {
            hash: [0u8; 32],
            version: SNAPSHOT_VERSION,
            created_at,
            next_id,
            vouchers,
        };
        snap.hash = snap.compute_hash();
        snap
    }

    fn compute_hash(&self) -> [u8; 32] {
        use blake2::digest::consts::U32;
        use blake2::{Blake2b, Digest};

        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.next_id.raw().to_le_bytes());
        for v in &self.vouchers {
            hasher.update(v.id().raw().to_le_bytes());
            hasher.update(v.funder().as_bytes());
            hasher.update(v.max_spend().raw().to_le_bytes());
            hasher.update(v.spent().raw().to_le_bytes());
            hasher.update(v.expiry().map_or(0u64, |e| e.as_secs()).to_le_bytes());
            hasher.update([v.is_revoked() as u8]);
            hasher.update(v.created_at().as_secs().to_le_bytes());
        }

        let result = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&result);
        out
    }

    /// Verify the snapshot hash matches the voucher data.
    pub fn verify(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Full validation: version, hash, and per-record invariants.
    pub fn check(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        if !self.verify() {
            return Err(SnapshotError::HashMismatch);
        }
        if self.next_id < VoucherId::FIRST {
            return Err(SnapshotError::Corrupt("next id is zero".into()));
        }
        let mut seen = HashSet::with_capacity(self.vouchers.len());
        for v in &self.vouchers {
            v.validate().map_err(SnapshotError::Corrupt)?;
            if v.id() >= self.next_id {
                return Err(SnapshotError::Corrupt(format!(
                    "voucher {} is not below next id {}",
                    v.id(),
                    self.next_id
                )));
            }
            if !seen.insert(v.id()) {
                return Err(SnapshotError::Corrupt(format!("duplicate voucher {}", v.id())));
            }
        }
        Ok(())
    }

    /// Serialize the snapshot to bytes (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }

    /// Deserialize a snapshot from bytes. Call [`LedgerSnapshot::check`]
    /// (or restore through the ledger) before trusting the contents.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        bincode::deserialize(bytes).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }

    pub fn voucher_count(&self) -> usize {
        self.vouchers.len()
    }
}
