use claw_store::{OwnershipError, ReserveError};
use claw_types::{Address, Amount, Timestamp, VoucherId};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{caller} may not {action} voucher {id}")]
    Unauthorized {
        id: VoucherId,
        caller: Address,
        action: &'static str,
    },

    #[error("voucher {0} not found")]
    NotFound(VoucherId),

    #[error("voucher {id} expired at {expiry}")]
    Expired { id: VoucherId, expiry: Timestamp },

    #[error("voucher {0} has been revoked")]
    Revoked(VoucherId),

    #[error("amount {requested} exceeds remaining {remaining} on voucher {id}")]
    ExceedsLimit {
        id: VoucherId,
        requested: Amount,
        remaining: Amount,
    },

    #[error("insufficient funds: {0}")]
    InsufficientFunds(#[source] ReserveError),

    #[error("reserve payout failed: {0}")]
    Settlement(#[source] ReserveError),

    #[error("ownership registry: {0}")]
    Registry(#[from] OwnershipError),
}

/// Coarse failure classes, one per error variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameters,
    Unauthorized,
    NotFound,
    Expired,
    Revoked,
    ExceedsLimit,
    InsufficientFunds,
    Settlement,
    Registry,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameters(_) => ErrorKind::InvalidParameters,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::Revoked(_) => ErrorKind::Revoked,
            Self::ExceedsLimit { .. } => ErrorKind::ExceedsLimit,
            Self::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Self::Settlement(_) => ErrorKind::Settlement,
            Self::Registry(_) => ErrorKind::Registry,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidParameters => "InvalidParameters",
            Self::Unauthorized => "Unauthorized",
            Self::NotFound => "NotFound",
            Self::Expired => "Expired",
            Self::Revoked => "Revoked",
            Self::ExceedsLimit => "ExceedsLimit",
            Self::InsufficientFunds => "InsufficientFunds",
            Self::Settlement => "Settlement",
            Self::Registry => "Registry",
        };
        f.write_str(name)
    }
}
