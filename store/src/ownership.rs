//! Ownership registry trait.

use crate::OwnershipError;
use claw_types::{Address, VoucherId};

/// External registry of who currently holds each voucher.
///
/// Holders change through [`OwnershipRegistry::transfer`], which the ledger
/// never calls; the ledger only mints on issuance, releases on burn, and
/// reads the current holder for authorization. Per-owner enumeration is a
/// derived index maintained on write.
pub trait OwnershipRegistry: Send + Sync {
    /// Current holder, `None` if the voucher is not minted.
    fn holder_of(&self, id: VoucherId) -> Option<Address>;

    /// Mint every entry, or none of them.
    fn mint_batch(&self, entries: &[(VoucherId, Address)]) -> Result<(), OwnershipError>;

    fn mint(&self, id: VoucherId, holder: Address) -> Result<(), OwnershipError> {
        self.mint_batch(&[(id, holder)])
    }

    /// Remove a voucher from the registry, returning its last holder.
    fn release(&self, id: VoucherId) -> Result<Address, OwnershipError>;

    /// Move a voucher from its current holder to `to`.
    fn transfer(&self, id: VoucherId, from: &Address, to: &Address) -> Result<(), OwnershipError>;

    /// Number of vouchers held by `owner`.
    fn balance_of(&self, owner: &Address) -> usize;

    /// The `index`-th voucher held by `owner`, in ascending id order.
    fn token_of_owner_by_index(&self, owner: &Address, index: usize) -> Option<VoucherId>;

    /// All vouchers held by `owner`, in ascending id order.
    fn tokens_of(&self, owner: &Address) -> Vec<VoucherId>;
}
