//! Persisted CLI state: the ledger snapshot plus both in-memory backends.
//!
//! Every CLI invocation loads `claw_state.bin`, applies one command and
//! saves the result. The file is written to a sibling temp path and renamed
//! into place so an interrupted run never leaves a truncated state file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use claw_ledger::{LedgerSnapshot, SnapshotError, VoucherLedger};
use claw_store::{MemoryOwnership, MemoryReserve, OwnershipState, ReserveState};
use claw_types::{Clock, LedgerParams, SystemClock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the persisted state inside the data directory.
pub const STATE_FILE: &str = "claw_state.bin";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    ledger: LedgerSnapshot,
    reserve: ReserveState,
    ownership: OwnershipState,
}

/// A ledger wired to in-memory backends, bound to a data directory.
pub struct Session {
    path: PathBuf,
    pub ledger: VoucherLedger,
    pub reserve: Arc<MemoryReserve>,
    pub ownership: Arc<MemoryOwnership>,
}

impl Session {
    /// Open the state in `data_dir`, starting empty if no state file exists.
    pub fn open(data_dir: &Path, params: LedgerParams) -> Result<Self, StateError> {
        Self::open_with_clock(data_dir, params, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        data_dir: &Path,
        params: LedgerParams,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StateError> {
        let path = data_dir.join(STATE_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no state file, starting empty");
            let reserve = Arc::new(MemoryReserve::new());
            let ownership = Arc::new(MemoryOwnership::new());
            let ledger = VoucherLedger::new(params, reserve.clone(), ownership.clone(), clock);
            return Ok(Self {
                path,
                ledger,
                reserve,
                ownership,
            });
        }

        let bytes = std::fs::read(&path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        let state: PersistedState = bincode::deserialize(&bytes)?;
        let reserve = Arc::new(MemoryReserve::from_state(state.reserve));
        let ownership = Arc::new(MemoryOwnership::from_state(state.ownership));
        let ledger = VoucherLedger::restore(
            state.ledger,
            params,
            reserve.clone(),
            ownership.clone(),
            clock,
        )?;
        tracing::debug!(
            path = %path.display(),
            vouchers = ledger.total_supply(),
            "state loaded"
        );
        Ok(Self {
            path,
            ledger,
            reserve,
            ownership,
        })
    }

    /// Write the current state back to the data directory.
    pub fn save(&self) -> Result<(), StateError> {
        let state = PersistedState {
            ledger: self.ledger.snapshot(),
            reserve: self.reserve.export(),
            ownership: self.ownership.export(),
        };
        let bytes = bincode::serialize(&state)?;

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| StateError::Io { path, source }
        };
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let tmp = self.path.with_extension("bin.tmp");
        std::fs::write(&tmp, &bytes).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;

        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "state saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
