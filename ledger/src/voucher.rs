//! The voucher record and its read-only view.

use claw_types::{Address, Amount, Timestamp, VoucherId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A capped, optionally time-limited spending authorization.
///
/// Fields are private so the record can only move forward: `spent` never
/// decreases, `revoked` never clears, `max_spend` never changes. Remaining
/// balance is always derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    id: VoucherId,
    funder: Address,
    max_spend: Amount,
    spent: Amount,
    expiry: Option<Timestamp>,
    revoked: bool,
    created_at: Timestamp,
}

impl Voucher {
    pub(crate) fn new(
        id: VoucherId,
        funder: Address,
        max_spend: Amount,
        expiry: Option<Timestamp>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            funder,
            max_spend,
            spent: Amount::ZERO,
            expiry,
            revoked: false,
            created_at,
        }
    }

    pub fn id(&self) -> VoucherId {
        self.id
    }

    pub fn funder(&self) -> Address {
        self.funder
    }

    pub fn max_spend(&self) -> Amount {
        self.max_spend
    }

    pub fn spent(&self) -> Amount {
        self.spent
    }

    pub fn expiry(&self) -> Option<Timestamp> {
        self.expiry
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn remaining(&self) -> Amount {
        self.max_spend.saturating_sub(self.spent)
    }

    /// Expired once `now` is strictly past the expiry second.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry.is_some_and(|e| e.is_passed(now))
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        !self.revoked && !self.is_expired(now) && !self.remaining().is_zero()
    }

    pub fn status(&self, now: Timestamp) -> VoucherStatus {
        if self.revoked {
            VoucherStatus::Revoked
        } else if self.is_expired(now) {
            VoucherStatus::Expired
        } else if self.remaining().is_zero() {
            VoucherStatus::Exhausted
        } else {
            VoucherStatus::Active
        }
    }

    /// Validate a draw of `amount` at `now` and return the new `spent` total.
    /// Does not mutate; the caller commits with [`Voucher::commit_spend`]
    /// once the payout has settled.
    pub(crate) fn check_draw(&self, amount: Amount, now: Timestamp) -> Result<Amount, LedgerError> {
        if self.revoked {
            return Err(LedgerError::Revoked(self.id));
        }
        if let Some(expiry) = self.expiry.filter(|e| e.is_passed(now)) {
            return Err(LedgerError::Expired { id: self.id, expiry });
        }
        let remaining = self.remaining();
        if amount > remaining {
            return Err(LedgerError::ExceedsLimit {
                id: self.id,
                requested: amount,
                remaining,
            });
        }
        self.spent
            .checked_add(amount)
            .ok_or_else(|| LedgerError::invalid("spent total overflows"))
    }

    pub(crate) fn commit_spend(&mut self, new_spent: Amount) {
        debug_assert!(new_spent >= self.spent && new_spent <= self.max_spend);
        self.spent = new_spent;
    }

    /// Set the revoked flag. Returns `false` if it was already set.
    pub(crate) fn revoke(&mut self) -> bool {
        !std::mem::replace(&mut self.revoked, true)
    }

    /// Structural invariants a restored record must satisfy.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_spend.is_zero() {
            return Err(format!("voucher {} has zero max_spend", self.id));
        }
        if self.spent > self.max_spend {
            return Err(format!(
                "voucher {} has spent {} above max_spend {}",
                self.id, self.spent, self.max_spend
            ));
        }
        if self.funder.is_zero() {
            return Err(format!("voucher {} has a zero funder", self.id));
        }
        Ok(())
    }
}

/// Lifecycle state of a live voucher as seen at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherStatus {
    Active,
    Revoked,
    Expired,
    /// Fully drawn down; still burnable but nothing left to refund.
    Exhausted,
}

/// Read-only view of a voucher, including its current holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherView {
    pub id: VoucherId,
    pub funder: Address,
    pub holder: Option<Address>,
    pub max_spend: Amount,
    pub spent: Amount,
    pub remaining: Amount,
    pub expiry: Option<Timestamp>,
    pub revoked: bool,
    pub status: VoucherStatus,
    pub created_at: Timestamp,
}

impl VoucherView {
    pub(crate) fn of(voucher: &Voucher, holder: Option<Address>, now: Timestamp) -> Self {
        Self {
            id: voucher.id,
            funder: voucher.funder,
            holder,
            max_spend: voucher.max_spend,
            spent: voucher.spent,
            remaining: voucher.remaining(),
            expiry: voucher.expiry,
            revoked: voucher.revoked,
            status: voucher.status(now),
            created_at: voucher.created_at,
        }
    }

    /// Expiry as unix seconds with `0` meaning none.
    pub fn expiry_secs(&self) -> u64 {
        self.expiry.map_or(0, |e| e.as_secs())
    }

    /// Share of the cap already drawn, in percent (0..=100).
    pub fn percent_used(&self) -> u8 {
        if self.max_spend.is_zero() {
            return 0;
        }
        (self.spent.raw().saturating_mul(100) / self.max_spend.raw()).min(100) as u8
    }
}
