use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use claw_types::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::{FundingReserve, ReserveError};

/// Serializable state of a [`MemoryReserve`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    /// Spendable balance per account, outside the pool.
    pub balances: HashMap<Address, Amount>,
    /// Amount each account has approved the ledger to collect.
    pub allowances: HashMap<Address, Amount>,
    /// Funds held on behalf of live vouchers.
    pub pool: Amount,
}

/// An in-memory asset with approve-then-collect semantics.
///
/// Funders must `approve` the ledger before it can `collect` from them, the
/// same two-step flow a token contract imposes.
#[derive(Default)]
pub struct MemoryReserve {
    state: Mutex<ReserveState>,
}

impl MemoryReserve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: ReserveState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn export(&self) -> ReserveState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, ReserveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit `amount` to `account` from outside the system.
    pub fn deposit(&self, account: &Address, amount: Amount) -> Result<(), ReserveError> {
        let mut state = self.lock();
        let balance = state.balances.entry(*account).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| ReserveError::Rejected("balance overflow".into()))?;
        Ok(())
    }

    /// Set the amount the ledger may collect from `account`. Replaces any
    /// previous approval.
    pub fn approve(&self, account: &Address, amount: Amount) {
        self.lock().allowances.insert(*account, amount);
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.lock().balances.get(account).copied().unwrap_or_default()
    }

    pub fn allowance(&self, account: &Address) -> Amount {
        self.lock().allowances.get(account).copied().unwrap_or_default()
    }

    /// Sum of all account balances plus the pool.
    pub fn total_supply(&self) -> Amount {
        let state = self.lock();
        state
            .balances
            .values()
            .fold(state.pool, |acc, b| acc.checked_add(*b).unwrap_or(Amount::new(u128::MAX)))
    }
}

impl FundingReserve for MemoryReserve {
    fn collect(&self, from: &Address, amount: Amount) -> Result<(), ReserveError> {
        let mut state = self.lock();
        let approved = state.allowances.get(from).copied().unwrap_or_default();
        if approved < amount {
            return Err(ReserveError::InsufficientAllowance {
                account: *from,
                needed: amount.raw(),
                approved: approved.raw(),
            });
        }
        let available = state.balances.get(from).copied().unwrap_or_default();
        if available < amount {
            return Err(ReserveError::InsufficientBalance {
                account: *from,
                needed: amount.raw(),
                available: available.raw(),
            });
        }
        let pool = state
            .pool
            .checked_add(amount)
            .ok_or_else(|| ReserveError::Rejected("pool overflow".into()))?;

        state.pool = pool;
        state.balances.insert(*from, available.saturating_sub(amount));
        state.allowances.insert(*from, approved.saturating_sub(amount));
        tracing::trace!(from = %from, amount = %amount, "reserve collected");
        Ok(())
    }

    fn disburse(&self, to: &Address, amount: Amount) -> Result<(), ReserveError> {
        let mut state = self.lock();
        if state.pool < amount {
            return Err(ReserveError::InsufficientPool {
                needed: amount.raw(),
                pooled: state.pool.raw(),
            });
        }
        let current = state.balances.get(to).copied().unwrap_or_default();
        let credited = current
            .checked_add(amount)
            .ok_or_else(|| ReserveError::Rejected("balance overflow".into()))?;

        state.pool = state.pool.saturating_sub(amount);
        state.balances.insert(*to, credited);
        tracing::trace!(to = %to, amount = %amount, "reserve disbursed");
        Ok(())
    }

    fn pooled(&self) -> Amount {
        self.lock().pool
    }
}
