//! Nullable reserve: a real in-memory asset with scripted failures.

use claw_store::{FundingReserve, MemoryReserve, ReserveError};
use claw_types::{Address, Amount};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// A settled reserve transfer, as observed by the nullable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReserveCall {
    Collect { from: Address, amount: Amount },
    Disburse { to: Address, amount: Amount },
}

/// A [`MemoryReserve`] that records settled transfers and can be told to
/// reject the next collect or disburse.
#[derive(Default)]
pub struct NullReserve {
    inner: MemoryReserve,
    calls: Mutex<Vec<ReserveCall>>,
    fail_next_collect: AtomicBool,
    fail_next_disburse: AtomicBool,
}

impl NullReserve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit and approve `amount` for `account` in one step.
    pub fn fund(&self, account: &Address, amount: Amount) {
        if let Err(e) = self.inner.deposit(account, amount) {
            panic!("null reserve deposit failed: {e}");
        }
        let approved = self.inner.allowance(account).checked_add(amount).unwrap_or(amount);
        self.inner.approve(account, approved);
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.inner.balance_of(account)
    }

    pub fn backend(&self) -> &MemoryReserve {
        &self.inner
    }

    /// The next `collect` fails with `Rejected` and moves nothing.
    pub fn fail_next_collect(&self) {
        self.fail_next_collect.store(true, Ordering::SeqCst);
    }

    /// The next `disburse` fails with `Rejected` and moves nothing.
    pub fn fail_next_disburse(&self) {
        self.fail_next_disburse.store(true, Ordering::SeqCst);
    }

    /// Settled transfers, oldest first.
    pub fn calls(&self) -> Vec<ReserveCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, call: ReserveCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

impl FundingReserve for NullReserve {
    fn collect(&self, from: &Address, amount: Amount) -> Result<(), ReserveError> {
        if self.fail_next_collect.swap(false, Ordering::SeqCst) {
            return Err(ReserveError::Rejected("scripted collect failure".into()));
        }
        self.inner.collect(from, amount)?;
        self.record(ReserveCall::Collect { from: *from, amount });
        Ok(())
    }

    fn disburse(&self, to: &Address, amount: Amount) -> Result<(), ReserveError> {
        if self.fail_next_disburse.swap(false, Ordering::SeqCst) {
            return Err(ReserveError::Rejected("scripted disburse failure".into()));
        }
        self.inner.disburse(to, amount)?;
        self.record(ReserveCall::Disburse { to: *to, amount });
        Ok(())
    }

    fn pooled(&self) -> Amount {
        self.inner.pooled()
    }
}
