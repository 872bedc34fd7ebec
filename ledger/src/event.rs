//! Events emitted after each committed ledger mutation.
//!
//! Every event carries `seq`, its position in the ledger's commit order. The
//! number is taken while the mutation still holds the voucher's lock, so for
//! one voucher `seq` order is commit order. Listeners run after the lock is
//! released and may observe events out of order; sort by `seq` to recover
//! the committed sequence.

use claw_types::{Address, Amount, Timestamp, VoucherId};

/// A committed ledger mutation. Rejected operations emit nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoucherEvent {
    /// A voucher was issued, alone or as part of a batch.
    Created {
        seq: u64,
        id: VoucherId,
        funder: Address,
        holder: Address,
        max_spend: Amount,
        expiry: Option<Timestamp>,
    },
    /// The holder paid `amount` to `to`.
    Spent {
        seq: u64,
        id: VoucherId,
        holder: Address,
        to: Address,
        amount: Amount,
    },
    /// The holder tipped another agent. `message` is carried verbatim.
    Tipped {
        seq: u64,
        id: VoucherId,
        holder: Address,
        to: Address,
        amount: Amount,
        message: String,
    },
    /// The funder revoked spending rights. Emitted once, on the first revoke.
    Revoked {
        seq: u64,
        id: VoucherId,
        funder: Address,
    },
    /// The funder burned the voucher and got `refunded` back.
    Burned {
        seq: u64,
        id: VoucherId,
        funder: Address,
        refunded: Amount,
    },
}

impl VoucherEvent {
    pub fn voucher(&self) -> VoucherId {
        match self {
            Self::Created { id, .. }
            | Self::Spent { id, .. }
            | Self::Tipped { id, .. }
            | Self::Revoked { id, .. }
            | Self::Burned { id, .. } => *id,
        }
    }

    /// Commit-order sequence number.
    pub fn seq(&self) -> u64 {
        match self {
            Self::Created { seq, .. }
            | Self::Spent { seq, .. }
            | Self::Tipped { seq, .. }
            | Self::Revoked { seq, .. }
            | Self::Burned { seq, .. } => *seq,
        }
    }
}

/// Synchronous fan-out event bus for voucher events.
///
/// Listeners run inline on the thread that committed the mutation, after the
/// voucher's lock is released, so they may call back into the ledger.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&VoucherEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&VoucherEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &VoucherEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
