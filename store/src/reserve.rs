//! Funding reserve trait.

use crate::ReserveError;
use claw_types::{Address, Amount};

/// The pooled asset vouchers draw from and return unused funds to.
///
/// Every transfer is all-or-nothing: on `Err` no balance has moved. The
/// ledger treats a successful return as an authoritative, settled transfer.
pub trait FundingReserve: Send + Sync {
    /// Pull `amount` from `from` into the pool as one transfer.
    fn collect(&self, from: &Address, amount: Amount) -> Result<(), ReserveError>;

    /// Pay `amount` out of the pool to `to`.
    fn disburse(&self, to: &Address, amount: Amount) -> Result<(), ReserveError>;

    /// Amount currently held in the pool.
    fn pooled(&self) -> Amount;
}
