use claw_types::{Address, VoucherId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReserveError {
    #[error("insufficient balance for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: Address,
        needed: u128,
        available: u128,
    },

    #[error("insufficient allowance for {account}: need {needed}, approved {approved}")]
    InsufficientAllowance {
        account: Address,
        needed: u128,
        approved: u128,
    },

    #[error("pool cannot cover payout: need {needed}, pooled {pooled}")]
    InsufficientPool { needed: u128, pooled: u128 },

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("voucher {0} is already minted")]
    AlreadyMinted(VoucherId),

    #[error("voucher {0} is not minted")]
    NotMinted(VoucherId),

    #[error("{caller} does not hold voucher {id}")]
    NotHolder { id: VoucherId, caller: Address },

    #[error("cannot assign a voucher to the zero address")]
    ZeroAddress,
}
