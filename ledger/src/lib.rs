//! Bounded-spending voucher ledger.
//!
//! A funder capitalizes a voucher with a spending cap and an optional
//! expiry; the voucher's current holder draws it down with `spend`/`tip`;
//! the funder can `revoke` further spending and `burn` the voucher to get
//! the unspent balance back.
//!
//! Guarantees:
//! - `spent <= max_spend` under any interleaving of concurrent draws.
//! - `create_batch` issues every voucher with one aggregate debit, or none.
//! - A failed reserve transfer leaves the voucher untouched.
//! - Burn happens at most once; afterwards the id is `NotFound`.

pub mod error;
pub mod event;
pub mod ledger;
pub mod snapshot;
pub mod voucher;

pub use error::{ErrorKind, LedgerError};
pub use event::{EventBus, VoucherEvent};
pub use ledger::{VoucherLedger, STAT_NAMES};
pub use snapshot::{LedgerSnapshot, SnapshotError, SNAPSHOT_VERSION};
pub use voucher::{Voucher, VoucherStatus, VoucherView};
