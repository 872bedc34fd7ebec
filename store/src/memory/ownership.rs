use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use claw_types::{Address, VoucherId};
use serde::{Deserialize, Serialize};

use crate::{OwnershipError, OwnershipRegistry};

/// Serializable state of a [`MemoryOwnership`].
///
/// Only `holders` is persisted; the per-owner index is rebuilt on load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipState {
    pub holders: BTreeMap<VoucherId, Address>,
}

#[derive(Default)]
struct Inner {
    holders: BTreeMap<VoucherId, Address>,
    by_owner: HashMap<Address, BTreeSet<VoucherId>>,
}

impl Inner {
    fn index(&mut self, id: VoucherId, owner: Address) {
        self.by_owner.entry(owner).or_default().insert(id);
    }

    fn unindex(&mut self, id: VoucherId, owner: &Address) {
        if let Some(set) = self.by_owner.get_mut(owner) {
            set.remove(&id);
            if set.is_empty() {
                self.by_owner.remove(owner);
            }
        }
    }
}

/// An in-memory, enumerable ownership registry.
#[derive(Default)]
pub struct MemoryOwnership {
    inner: Mutex<Inner>,
}

impl MemoryOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: OwnershipState) -> Self {
        let mut inner = Inner::default();
        for (&id, &owner) in &state.holders {
            inner.index(id, owner);
        }
        inner.holders = state.holders;
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn export(&self) -> OwnershipState {
        OwnershipState {
            holders: self.lock().holders.clone(),
        }
    }

    /// Number of minted vouchers.
    pub fn len(&self) -> usize {
        self.lock().holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OwnershipRegistry for MemoryOwnership {
    fn holder_of(&self, id: VoucherId) -> Option<Address> {
        self.lock().holders.get(&id).copied()
    }

    fn mint_batch(&self, entries: &[(VoucherId, Address)]) -> Result<(), OwnershipError> {
        let mut inner = self.lock();
        let mut seen = BTreeSet::new();
        for (id, holder) in entries {
            if holder.is_zero() {
                return Err(OwnershipError::ZeroAddress);
            }
            if inner.holders.contains_key(id) || !seen.insert(*id) {
                return Err(OwnershipError::AlreadyMinted(*id));
            }
        }
        for &(id, holder) in entries {
            inner.holders.insert(id, holder);
            inner.index(id, holder);
        }
        Ok(())
    }

    fn release(&self, id: VoucherId) -> Result<Address, OwnershipError> {
        let mut inner = self.lock();
        let owner = inner
            .holders
            .remove(&id)
            .ok_or(OwnershipError::NotMinted(id))?;
        inner.unindex(id, &owner);
        Ok(owner)
    }

    fn transfer(&self, id: VoucherId, from: &Address, to: &Address) -> Result<(), OwnershipError> {
        if to.is_zero() {
            return Err(OwnershipError::ZeroAddress);
        }
        let mut inner = self.lock();
        let current = inner
            .holders
            .get(&id)
            .copied()
            .ok_or(OwnershipError::NotMinted(id))?;
        if current != *from {
            return Err(OwnershipError::NotHolder { id, caller: *from });
        }
        inner.unindex(id, from);
        inner.holders.insert(id, *to);
        inner.index(id, *to);
        tracing::debug!(voucher = %id, from = %from, to = %to, "voucher transferred");
        Ok(())
    }

    fn balance_of(&self, owner: &Address) -> usize {
        self.lock().by_owner.get(owner).map_or(0, BTreeSet::len)
    }

    fn token_of_owner_by_index(&self, owner: &Address, index: usize) -> Option<VoucherId> {
        self.lock()
            .by_owner
            .get(owner)
            .and_then(|set| set.iter().nth(index).copied())
    }

    fn tokens_of(&self, owner: &Address) -> Vec<VoucherId> {
        self.lock()
            .by_owner
            .get(owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
