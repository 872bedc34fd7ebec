//! The voucher ledger: issuance, spend/tip settlement, revoke, burn, queries.
//!
//! Locking:
//! - Each voucher lives in its own `Mutex` slot. Spend, tip, revoke and burn
//!   hold that lock across check, reserve transfer and commit, so mutations
//!   of one voucher are linearizable and vouchers never contend with each
//!   other.
//! - The table `RwLock` guards the id -> slot map and the funder index. It
//!   is write-locked only to insert a batch or remove a burned voucher, and
//!   is never held while waiting for a slot lock.
//! - Reserve and registry locks are leaves: nothing is acquired under them.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use claw_store::{FundingReserve, OwnershipRegistry};
use claw_types::{Address, Amount, Clock, LedgerParams, Timestamp, VoucherId};
use claw_utils::StatsCounter;

use crate::error::LedgerError;
use crate::event::{EventBus, VoucherEvent};
use crate::snapshot::{LedgerSnapshot, SnapshotError};
use crate::voucher::{Voucher, VoucherView};

/// Counter names reported by [`VoucherLedger::stats`].
pub const STAT_NAMES: &[&str] = &["created", "spent", "tipped", "revoked", "burned", "rejected"];

/// `None` once the voucher has been burned.
type Slot = Arc<Mutex<Option<Voucher>>>;

#[derive(Default)]
struct VoucherTable {
    slots: HashMap<VoucherId, Slot>,
    by_funder: HashMap<Address, BTreeSet<VoucherId>>,
}

impl VoucherTable {
    fn insert(&mut self, voucher: Voucher) {
        self.by_funder
            .entry(voucher.funder())
            .or_default()
            .insert(voucher.id());
        self.slots
            .insert(voucher.id(), Arc::new(Mutex::new(Some(voucher))));
    }

    fn remove(&mut self, id: VoucherId, funder: &Address) {
        self.slots.remove(&id);
        if let Some(ids) = self.by_funder.get_mut(funder) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_funder.remove(funder);
            }
        }
    }
}

/// Recipient of a draw against a voucher.
enum Draw<'a> {
    Spend,
    Tip { message: &'a str },
}

/// Owns voucher records and enforces the spending cap, expiry, revocation
/// and once-only burn.
pub struct VoucherLedger {
    params: LedgerParams,
    reserve: Arc<dyn FundingReserve>,
    registry: Arc<dyn OwnershipRegistry>,
    clock: Arc<dyn Clock>,
    table: RwLock<VoucherTable>,
    /// Next id to hand out.
    next_id: AtomicU64,
    /// Next event sequence number.
    event_seq: AtomicU64,
    events: EventBus,
    stats: StatsCounter,
}

impl VoucherLedger {
    pub fn new(
        params: LedgerParams,
        reserve: Arc<dyn FundingReserve>,
        registry: Arc<dyn OwnershipRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            params,
            reserve,
            registry,
            clock,
            table: RwLock::new(VoucherTable::default()),
            next_id: AtomicU64::new(VoucherId::FIRST.raw()),
            event_seq: AtomicU64::new(1),
            events: EventBus::new(),
            stats: StatsCounter::new(STAT_NAMES),
        }
    }

    /// Rebuild a ledger from a snapshot. The reserve and registry are
    /// expected to hold the state that was saved alongside it.
    pub fn restore(
        snapshot: LedgerSnapshot,
        params: LedgerParams,
        reserve: Arc<dyn FundingReserve>,
        registry: Arc<dyn OwnershipRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SnapshotError> {
        snapshot.check()?;
        let ledger = Self::new(params, reserve, registry, clock);
        ledger.next_id.store(snapshot.next_id.raw(), Ordering::SeqCst);
        {
            let mut table = ledger.write_table();
            for voucher in snapshot.vouchers {
                table.insert(voucher);
            }
        }
        tracing::info!(
            vouchers = ledger.total_supply(),
            next_id = snapshot.next_id.raw(),
            "ledger restored from snapshot"
        );
        Ok(ledger)
    }

    /// Register a listener for committed mutations.
    pub fn subscribe(&mut self, listener: Box<dyn Fn(&VoucherEvent) + Send + Sync>) {
        self.events.subscribe(listener);
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    // ── Issuance ───────────────────────────────────────────────────────

    /// Issue one voucher to `agent`, debiting `max_spend` from `funder`.
    pub fn create(
        &self,
        funder: &Address,
        agent: &Address,
        max_spend: Amount,
        expiry: Option<Timestamp>,
    ) -> Result<VoucherId, LedgerError> {
        let result = self
            .issue(funder, std::slice::from_ref(agent), max_spend, expiry)
            .and_then(|ids| {
                ids.first()
                    .copied()
                    .ok_or_else(|| LedgerError::invalid("no voucher issued"))
            });
        self.observe("create", result)
    }

    /// Issue one voucher per agent, all or none, with a single aggregate
    /// debit of `max_spend_each * agents.len()`.
    pub fn create_batch(
        &self,
        funder: &Address,
        agents: &[Address],
        max_spend_each: Amount,
        expiry: Option<Timestamp>,
    ) -> Result<Vec<VoucherId>, LedgerError> {
        let result = self.issue(funder, agents, max_spend_each, expiry);
        self.observe("create_batch", result)
    }

    fn issue(
        &self,
        funder: &Address,
        agents: &[Address],
        max_spend_each: Amount,
        expiry: Option<Timestamp>,
    ) -> Result<Vec<VoucherId>, LedgerError> {
        if agents.is_empty() {
            return Err(LedgerError::invalid("agent list is empty"));
        }
        if agents.len() > self.params.max_batch_size {
            return Err(LedgerError::invalid(format!(
                "batch of {} agents exceeds the limit of {}",
                agents.len(),
                self.params.max_batch_size
            )));
        }
        if funder.is_zero() {
            return Err(LedgerError::invalid("funder is the zero address"));
        }
        if agents.iter().any(Address::is_zero) {
            return Err(LedgerError::invalid("agent is the zero address"));
        }
        if max_spend_each.is_zero() {
            return Err(LedgerError::invalid("max_spend must be positive"));
        }
        let now = self.clock.now();
        if let Some(expiry) = expiry {
            if expiry <= now {
                return Err(LedgerError::invalid(format!(
                    "expiry {expiry} is not after now ({now})"
                )));
            }
        }
        let total = max_spend_each
            .checked_mul(agents.len() as u128)
            .ok_or_else(|| LedgerError::invalid("aggregate debit overflows"))?;

        self.reserve
            .collect(funder, total)
            .map_err(LedgerError::InsufficientFunds)?;

        let ids = match self.allocate_ids(agents.len()) {
            Ok(ids) => ids,
            Err(e) => return Err(self.abort_issue(funder, total, e)),
        };
        let entries: Vec<(VoucherId, Address)> =
            ids.iter().copied().zip(agents.iter().copied()).collect();

        let first_seq = {
            let mut table = self.write_table();
            if let Err(e) = self.registry.mint_batch(&entries) {
                drop(table);
                return Err(self.abort_issue(funder, total, e.into()));
            }
            for &(id, _) in &entries {
                table.insert(Voucher::new(id, *funder, max_spend_each, expiry, now));
            }
            self.event_seq
                .fetch_add(entries.len() as u64, Ordering::SeqCst)
        };

        self.stats.add("created", entries.len() as u64);
        tracing::info!(
            funder = %funder,
            count = entries.len(),
            max_spend_each = %max_spend_each,
            total = %total,
            first = %ids[0],
            "vouchers issued"
        );
        for (seq, (id, holder)) in (first_seq..).zip(entries) {
            self.events.emit(&VoucherEvent::Created {
                seq,
                id,
                funder: *funder,
                holder,
                max_spend: max_spend_each,
                expiry,
            });
        }
        Ok(ids)
    }

    fn allocate_ids(&self, count: usize) -> Result<Vec<VoucherId>, LedgerError> {
        let count = count as u64;
        let start = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| cur.checked_add(count))
            .map_err(|_| LedgerError::invalid("voucher id space exhausted"))?;
        Ok((start..start + count).map(VoucherId::new).collect())
    }

    /// Return an already-collected debit after issuance could not complete.
    fn abort_issue(&self, funder: &Address, total: Amount, cause: LedgerError) -> LedgerError {
        match self.reserve.disburse(funder, total) {
            Ok(()) => {
                tracing::warn!(funder = %funder, amount = %total, error = %cause, "issuance aborted, debit returned");
            }
            Err(refund) => {
                tracing::error!(
                    funder = %funder,
                    amount = %total,
                    error = %cause,
                    refund_error = %refund,
                    "issuance aborted and debit could not be returned"
                );
            }
        }
        cause
    }

    // ── Spend / tip ────────────────────────────────────────────────────

    /// Pay `amount` from voucher `id` to `to`. Only the current holder may spend.
    pub fn spend(
        &self,
        caller: &Address,
        id: VoucherId,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let result = self.draw(caller, id, to, amount, Draw::Spend);
        self.observe("spend", result)
    }

    /// Pay `amount` from voucher `id` to another agent. Settles exactly like
    /// [`VoucherLedger::spend`]; `message` is carried into the event and log
    /// but never interpreted.
    pub fn tip(
        &self,
        caller: &Address,
        id: VoucherId,
        to_agent: &Address,
        amount: Amount,
        message: &str,
    ) -> Result<(), LedgerError> {
        let result = self.draw(caller, id, to_agent, amount, Draw::Tip { message });
        self.observe("tip", result)
    }

    fn draw(
        &self,
        caller: &Address,
        id: VoucherId,
        to: &Address,
        amount: Amount,
        kind: Draw<'_>,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::invalid("amount must be positive"));
        }
        if to.is_zero() {
            return Err(LedgerError::invalid("recipient is the zero address"));
        }
        if *to == self.params.ledger_address {
            return Err(LedgerError::invalid("recipient is the ledger itself"));
        }

        let slot = self.slot(id)?;
        let (remaining, seq) = {
            let mut guard = lock_slot(&slot);
            let voucher = guard.as_mut().ok_or(LedgerError::NotFound(id))?;
            if self.registry.holder_of(id) != Some(*caller) {
                return Err(LedgerError::Unauthorized {
                    id,
                    caller: *caller,
                    action: "spend from",
                });
            }
            let new_spent = voucher.check_draw(amount, self.clock.now())?;
            self.reserve.disburse(to, amount).map_err(|e| {
                tracing::warn!(voucher = %id, to = %to, amount = %amount, error = %e, "payout failed");
                LedgerError::Settlement(e)
            })?;
            voucher.commit_spend(new_spent);
            (voucher.remaining(), self.next_seq())
        };

        let event = match kind {
            Draw::Spend => {
                self.stats.increment("spent");
                tracing::info!(voucher = %id, to = %to, amount = %amount, remaining = %remaining, "voucher spent");
                VoucherEvent::Spent {
                    seq,
                    id,
                    holder: *caller,
                    to: *to,
                    amount,
                }
            }
            Draw::Tip { message } => {
                self.stats.increment("tipped");
                tracing::info!(voucher = %id, to = %to, amount = %amount, remaining = %remaining, tip_message = message, "voucher tipped");
                VoucherEvent::Tipped {
                    seq,
                    id,
                    holder: *caller,
                    to: *to,
                    amount,
                    message: message.to_string(),
                }
            }
        };
        self.events.emit(&event);
        Ok(())
    }

    // ── Revoke / burn ──────────────────────────────────────────────────

    /// Permanently stop spending from voucher `id`. Funder only; repeat
    /// calls succeed without effect.
    pub fn revoke(&self, caller: &Address, id: VoucherId) -> Result<(), LedgerError> {
        let result = self.revoke_inner(caller, id);
        self.observe("revoke", result)
    }

    fn revoke_inner(&self, caller: &Address, id: VoucherId) -> Result<(), LedgerError> {
        let slot = self.slot(id)?;
        let changed = {
            let mut guard = lock_slot(&slot);
            let voucher = guard.as_mut().ok_or(LedgerError::NotFound(id))?;
            if voucher.funder() != *caller {
                return Err(LedgerError::Unauthorized {
                    id,
                    caller: *caller,
                    action: "revoke",
                });
            }
            voucher.revoke().then(|| self.next_seq())
        };

        if let Some(seq) = changed {
            self.stats.increment("revoked");
            tracing::info!(voucher = %id, "voucher revoked");
            self.events.emit(&VoucherEvent::Revoked {
                seq,
                id,
                funder: *caller,
            });
        } else {
            tracing::debug!(voucher = %id, "voucher already revoked");
        }
        Ok(())
    }

    /// Refund the unspent balance to the funder and finalize the voucher.
    /// Funder only; allowed whether or not the voucher is revoked or expired.
    /// Returns the refunded amount.
    pub fn burn(&self, caller: &Address, id: VoucherId) -> Result<Amount, LedgerError> {
        let result = self.burn_inner(caller, id);
        self.observe("burn", result)
    }

    fn burn_inner(&self, caller: &Address, id: VoucherId) -> Result<Amount, LedgerError> {
        let slot = self.slot(id)?;
        let mut guard = lock_slot(&slot);
        let voucher = guard.as_ref().ok_or(LedgerError::NotFound(id))?;
        let funder = voucher.funder();
        if funder != *caller {
            return Err(LedgerError::Unauthorized {
                id,
                caller: *caller,
                action: "burn",
            });
        }
        let refund = voucher.remaining();

        // Release before the refund; a failed refund restores the holder.
        let holder = self.registry.release(id)?;
        if !refund.is_zero() {
            if let Err(e) = self.reserve.disburse(&funder, refund) {
                tracing::warn!(voucher = %id, amount = %refund, error = %e, "refund failed");
                if let Err(restore) = self.registry.mint(id, holder) {
                    tracing::error!(
                        voucher = %id,
                        holder = %holder,
                        error = %restore,
                        "holder could not be restored after failed refund"
                    );
                }
                return Err(LedgerError::Settlement(e));
            }
        }
        *guard = None;
        self.write_table().remove(id, &funder);
        let seq = self.next_seq();
        drop(guard);

        self.stats.increment("burned");
        tracing::info!(voucher = %id, refunded = %refund, "voucher burned");
        self.events.emit(&VoucherEvent::Burned {
            seq,
            id,
            funder,
            refunded: refund,
        });
        Ok(refund)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// `max_spend - spent` for a live voucher.
    pub fn get_remaining(&self, id: VoucherId) -> Result<Amount, LedgerError> {
        self.with_voucher(id, Voucher::remaining)
    }

    /// True iff the voucher exists, is not revoked, not expired, and has
    /// something left to spend.
    pub fn is_active(&self, id: VoucherId) -> bool {
        let now = self.clock.now();
        self.with_voucher(id, |v| v.is_active(now)).unwrap_or(false)
    }

    /// Full view of a live voucher, including its current holder.
    pub fn voucher(&self, id: VoucherId) -> Result<VoucherView, LedgerError> {
        let now = self.clock.now();
        let holder = self.registry.holder_of(id);
        self.with_voucher(id, |v| VoucherView::of(v, holder, now))
    }

    /// Current holder of a live voucher.
    pub fn owner_of(&self, id: VoucherId) -> Result<Address, LedgerError> {
        self.with_voucher(id, |_| ())?;
        self.registry.holder_of(id).ok_or(LedgerError::NotFound(id))
    }

    pub fn balance_of(&self, owner: &Address) -> usize {
        self.registry.balance_of(owner)
    }

    pub fn token_of_owner_by_index(&self, owner: &Address, index: usize) -> Option<VoucherId> {
        self.registry.token_of_owner_by_index(owner, index)
    }

    pub fn vouchers_held_by(&self, owner: &Address) -> Vec<VoucherId> {
        self.registry.tokens_of(owner)
    }

    /// Live vouchers funded by `funder`, ascending by id.
    pub fn vouchers_funded_by(&self, funder: &Address) -> Vec<VoucherId> {
        self.read_table()
            .by_funder
            .get(funder)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Ids of all live vouchers, ascending.
    pub fn voucher_ids(&self) -> Vec<VoucherId> {
        let mut ids: Vec<VoucherId> = self.read_table().slots.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live (not burned) vouchers.
    pub fn total_supply(&self) -> usize {
        self.read_table().slots.len()
    }

    /// Number of ids handed out so far, burned vouchers included.
    pub fn total_issued(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - VoucherId::FIRST.raw()
    }

    /// Sum of remaining balances across live vouchers. A reserve dedicated
    /// to this ledger pools exactly this much.
    pub fn outstanding(&self) -> Amount {
        self.live_vouchers()
            .iter()
            .fold(Amount::ZERO, |acc, v| {
                acc.checked_add(v.remaining()).unwrap_or(Amount::new(u128::MAX))
            })
    }

    pub fn stats(&self) -> HashMap<&'static str, u64> {
        self.stats.snapshot()
    }

    /// Capture every live voucher. Each record is internally consistent;
    /// take snapshots while no mutations are in flight for a consistent cut.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let next_id = VoucherId::new(self.next_id.load(Ordering::SeqCst));
        LedgerSnapshot::create(self.live_vouchers(), next_id, self.clock.now())
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn observe<T>(&self, op: &'static str, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
        if let Err(e) = &result {
            self.stats.increment("rejected");
            tracing::debug!(op, kind = %e.kind(), error = %e, "operation rejected");
        }
        result
    }

    fn next_seq(&self) -> u64 {
        self.event_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn slot(&self, id: VoucherId) -> Result<Slot, LedgerError> {
        self.read_table()
            .slots
            .get(&id)
            .cloned()
            .ok_or(LedgerError::NotFound(id))
    }

    fn with_voucher<T>(&self, id: VoucherId, f: impl FnOnce(&Voucher) -> T) -> Result<T, LedgerError> {
        let slot = self.slot(id)?;
        let guard = lock_slot(&slot);
        guard.as_ref().map(f).ok_or(LedgerError::NotFound(id))
    }

    fn live_vouchers(&self) -> Vec<Voucher> {
        let slots: Vec<Slot> = self.read_table().slots.values().cloned().collect();
        let mut vouchers: Vec<Voucher> = slots
            .iter()
            .filter_map(|slot| lock_slot(slot).clone())
            .collect();
        vouchers.sort_by_key(Voucher::id);
        vouchers
    }

    fn read_table(&self) -> RwLockReadGuard<'_, VoucherTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, VoucherTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Every critical section commits its mutation last and infallibly, so a
/// poisoned slot still holds a consistent record.
fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Voucher>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::voucher::VoucherStatus;
    use claw_nullables::{NullClock, NullReserve, ReserveCall};
    use claw_store::MemoryOwnership;

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        ledger: VoucherLedger,
        reserve: Arc<NullReserve>,
        registry: Arc<MemoryOwnership>,
        clock: Arc<NullClock>,
    }

    fn fixture() -> Fixture {
        let reserve = Arc::new(NullReserve::new());
        let registry = Arc::new(MemoryOwnership::new());
        let clock = Arc::new(NullClock::new(NOW));
        let ledger = VoucherLedger::new(
            LedgerParams::default(),
            reserve.clone(),
            registry.clone(),
            clock.clone(),
        );
        reserve.fund(&funder(), units(1_000));
        Fixture {
            ledger,
            reserve,
            registry,
            clock,
        }
    }

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn funder() -> Address {
        addr(0xf0)
    }

    fn agent() -> Address {
        addr(0xa1)
    }

    fn merchant() -> Address {
        addr(0x3c)
    }

    fn units(n: u64) -> Amount {
        Amount::from_units(n)
    }

    fn at(secs: u64) -> Option<Timestamp> {
        Some(Timestamp::new(secs))
    }

    #[test]
    fn create_debits_funder_and_assigns_holder() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(100), None).unwrap();

        assert_eq!(id, VoucherId::FIRST);
        assert_eq!(f.reserve.balance_of(&funder()), units(900));
        assert_eq!(f.reserve.pooled(), units(100));
        assert_eq!(f.ledger.owner_of(id).unwrap(), agent());
        assert_eq!(f.ledger.get_remaining(id).unwrap(), units(100));
        assert!(f.ledger.is_active(id));
    }

    #[test]
    fn ids_are_monotonic() {
        let f = fixture();
        let a = f.ledger.create(&funder(), &agent(), units(1), None).unwrap();
        let b = f.ledger.create(&funder(), &agent(), units(1), None).unwrap();
        assert!(b > a);
        assert_eq!(f.ledger.total_issued(), 2);
    }

    #[test]
    fn create_rejects_zero_cap() {
        let f = fixture();
        let err = f.ledger.create(&funder(), &agent(), Amount::ZERO, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert_eq!(f.reserve.pooled(), Amount::ZERO);
    }

    #[test]
    fn create_rejects_past_or_present_expiry() {
        let f = fixture();
        let past = f.ledger.create(&funder(), &agent(), units(1), at(NOW - 1)).unwrap_err();
        assert_eq!(past.kind(), ErrorKind::InvalidParameters);
        let present = f.ledger.create(&funder(), &agent(), units(1), at(NOW)).unwrap_err();
        assert_eq!(present.kind(), ErrorKind::InvalidParameters);
        assert!(f.ledger.create(&funder(), &agent(), units(1), at(NOW + 1)).is_ok());
    }

    #[test]
    fn create_rejects_zero_addresses() {
        let f = fixture();
        let err = f.ledger.create(&funder(), &Address::ZERO, units(1), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        let err = f.ledger.create(&Address::ZERO, &agent(), units(1), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }

    #[test]
    fn create_without_funds_fails_cleanly() {
        let f = fixture();
        let err = f.ledger.create(&funder(), &agent(), units(5_000), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(f.ledger.total_supply(), 0);
        assert_eq!(f.ledger.total_issued(), 0);
        assert!(f.registry.is_empty());
    }

    #[test]
    fn rejected_collect_is_insufficient_funds() {
        let f = fixture();
        f.reserve.fail_next_collect();
        let err = f.ledger.create(&funder(), &agent(), units(10), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(f.ledger.total_supply(), 0);
        assert_eq!(f.ledger.total_issued(), 0);
        assert!(f.registry.is_empty());
        assert_eq!(f.reserve.balance_of(&funder()), units(1_000));

        f.reserve.fail_next_collect();
        let err = f
            .ledger
            .create_batch(&funder(), &[addr(1), addr(2)], units(10), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert!(f.reserve.calls().is_empty());

        assert_eq!(f.ledger.create(&funder(), &agent(), units(10), None).unwrap(), VoucherId::FIRST);
    }

    #[test]
    fn spend_scenario_from_cap_to_rejection() {
        let f = fixture();
        let v1 = f.ledger.create(&funder(), &agent(), units(100), None).unwrap();

        f.ledger.spend(&agent(), v1, &merchant(), units(40)).unwrap();
        assert_eq!(f.ledger.get_remaining(v1).unwrap(), units(60));
        assert_eq!(f.reserve.balance_of(&merchant()), units(40));

        let err = f.ledger.spend(&agent(), v1, &merchant(), units(70)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExceedsLimit);
        assert_eq!(f.ledger.get_remaining(v1).unwrap(), units(60));
        assert_eq!(f.reserve.balance_of(&merchant()), units(40));
    }

    #[test]
    fn spend_by_non_holder_is_unauthorized() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        let err = f.ledger.spend(&funder(), id, &merchant(), units(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn spend_follows_external_transfer() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        f.registry.transfer(id, &agent(), &addr(0xb2)).unwrap();

        let err = f.ledger.spend(&agent(), id, &merchant(), units(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        f.ledger.spend(&addr(0xb2), id, &merchant(), units(1)).unwrap();
        assert_eq!(f.ledger.vouchers_held_by(&addr(0xb2)), vec![id]);
    }

    #[test]
    fn spend_rejects_zero_amount_and_invalid_recipients() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        let ledger_addr = f.ledger.params().ledger_address;

        for (to, amount) in [
            (merchant(), Amount::ZERO),
            (Address::ZERO, units(1)),
            (ledger_addr, units(1)),
        ] {
            let err = f.ledger.spend(&agent(), id, &to, amount).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        }
        assert_eq!(f.ledger.get_remaining(id).unwrap(), units(10));
    }

    #[test]
    fn spend_after_expiry_fails() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), at(NOW + 3_600)).unwrap();
        f.clock.set(NOW + 3_600);
        f.ledger.spend(&agent(), id, &merchant(), units(1)).unwrap();

        f.clock.set(NOW + 3_601);
        let err = f.ledger.spend(&agent(), id, &merchant(), units(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
        assert!(!f.ledger.is_active(id));
        assert_eq!(f.ledger.voucher(id).unwrap().status, VoucherStatus::Expired);
    }

    #[test]
    fn failed_payout_leaves_spent_unchanged() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        f.reserve.fail_next_disburse();

        let err = f.ledger.spend(&agent(), id, &merchant(), units(4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Settlement);
        assert_eq!(f.ledger.get_remaining(id).unwrap(), units(10));
        assert_eq!(f.reserve.pooled(), units(10));
    }

    #[test]
    fn tip_settles_like_spend_and_carries_message() {
        let mut f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.ledger.subscribe(Box::new(move |e| sink.lock().unwrap().push(e.clone())));

        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        f.ledger.tip(&agent(), id, &addr(0xb2), units(3), "thanks for the data").unwrap();

        assert_eq!(f.ledger.get_remaining(id).unwrap(), units(7));
        assert_eq!(f.reserve.balance_of(&addr(0xb2)), units(3));
        let events = seen.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(VoucherEvent::Tipped { message, amount, .. })
                if message == "thanks for the data" && *amount == units(3)
        ));
    }

    #[test]
    fn tip_is_checked_like_spend() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), at(NOW + 60)).unwrap();

        let err = f.ledger.tip(&funder(), id, &addr(0xb2), units(1), "hi").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = f.ledger.tip(&agent(), id, &addr(0xb2), units(11), "hi").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExceedsLimit);

        f.ledger.tip(&agent(), id, &addr(0xb2), units(4), "hi").unwrap();
        let err = f.ledger.tip(&agent(), id, &addr(0xb2), units(7), "hi").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExceedsLimit);

        f.clock.set(NOW + 61);
        let err = f.ledger.tip(&agent(), id, &addr(0xb2), units(1), "hi").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);

        assert_eq!(f.ledger.get_remaining(id).unwrap(), units(6));
        assert_eq!(f.reserve.balance_of(&addr(0xb2)), units(4));
        assert_eq!(f.ledger.stats()["tipped"], 1);
    }

    #[test]
    fn revoke_is_idempotent_and_blocks_spending() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        f.ledger.revoke(&funder(), id).unwrap();
        let once = f.ledger.voucher(id).unwrap();
        f.ledger.revoke(&funder(), id).unwrap();
        assert_eq!(f.ledger.voucher(id).unwrap(), once);
        assert_eq!(f.ledger.stats()["revoked"], 1);

        let err = f.ledger.spend(&agent(), id, &merchant(), units(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Revoked);
        let err = f.ledger.tip(&agent(), id, &merchant(), units(1), "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Revoked);
    }

    #[test]
    fn revoke_by_holder_is_unauthorized() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        let err = f.ledger.revoke(&agent(), id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(f.ledger.is_active(id));
    }

    #[test]
    fn burn_after_revoke_refunds_remaining() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(100), None).unwrap();
        f.ledger.spend(&agent(), id, &merchant(), units(25)).unwrap();
        f.ledger.revoke(&funder(), id).unwrap();

        let refunded = f.ledger.burn(&funder(), id).unwrap();
        assert_eq!(refunded, units(75));
        assert_eq!(f.reserve.balance_of(&funder()), units(975));
        assert_eq!(f.reserve.pooled(), Amount::ZERO);
        assert_eq!(f.ledger.get_remaining(id).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(f.ledger.voucher(id).is_err());
        assert_eq!(f.ledger.balance_of(&agent()), 0);
        assert!(f.ledger.vouchers_funded_by(&funder()).is_empty());
    }

    #[test]
    fn burn_twice_fails_not_found() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        f.ledger.burn(&funder(), id).unwrap();
        let err = f.ledger.burn(&funder(), id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.reserve.balance_of(&funder()), units(1_000));
    }

    #[test]
    fn burn_by_holder_is_unauthorized() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        let err = f.ledger.burn(&agent(), id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(f.ledger.is_active(id));
    }

    #[test]
    fn funder_who_is_also_holder_can_burn() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &funder(), units(10), None).unwrap();
        assert_eq!(f.ledger.burn(&funder(), id).unwrap(), units(10));
    }

    #[test]
    fn burn_is_allowed_before_and_after_expiry() {
        let f = fixture();
        let early = f.ledger.create(&funder(), &agent(), units(10), at(NOW + 60)).unwrap();
        let late = f.ledger.create(&funder(), &agent(), units(20), at(NOW + 60)).unwrap();

        assert_eq!(f.ledger.burn(&funder(), early).unwrap(), units(10));
        f.clock.advance(61);
        assert!(!f.ledger.is_active(late));
        assert_eq!(f.ledger.burn(&funder(), late).unwrap(), units(20));
    }

    #[test]
    fn burn_of_exhausted_voucher_refunds_nothing() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(5), None).unwrap();
        f.ledger.spend(&agent(), id, &merchant(), units(5)).unwrap();
        assert!(!f.ledger.is_active(id));
        assert_eq!(f.ledger.burn(&funder(), id).unwrap(), Amount::ZERO);
        assert!(!f
            .reserve
            .calls()
            .contains(&ReserveCall::Disburse { to: funder(), amount: Amount::ZERO }));
    }

    #[test]
    fn failed_refund_keeps_voucher_alive() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        f.reserve.fail_next_disburse();
        let err = f.ledger.burn(&funder(), id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Settlement);
        assert_eq!(f.ledger.get_remaining(id).unwrap(), units(10));
        assert_eq!(f.ledger.owner_of(id).unwrap(), agent());
        assert_eq!(f.ledger.vouchers_held_by(&agent()), vec![id]);
        assert_eq!(f.ledger.burn(&funder(), id).unwrap(), units(10));
        assert!(f.ledger.vouchers_held_by(&agent()).is_empty());
    }

    #[test]
    fn burn_aborts_when_registry_release_fails() {
        let f = fixture();
        let id = f.ledger.create(&funder(), &agent(), units(10), None).unwrap();
        // Drop the registry entry behind the ledger's back.
        f.registry.release(id).unwrap();

        let err = f.ledger.burn(&funder(), id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert_eq!(f.ledger.get_remaining(id).unwrap(), units(10));
        assert_eq!(f.reserve.pooled(), units(10));
        assert_eq!(f.reserve.balance_of(&funder()), units(990));
        assert_eq!(f.ledger.stats()["burned"], 0);
    }

    #[test]
    fn events_carry_commit_order() {
        let mut f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.ledger.subscribe(Box::new(move |e| sink.lock().unwrap().push(e.clone())));

        let ids = f
            .ledger
            .create_batch(&funder(), &[agent(), addr(2)], units(10), None)
            .unwrap();
        f.ledger.spend(&agent(), ids[0], &merchant(), units(1)).unwrap();
        f.ledger.revoke(&funder(), ids[0]).unwrap();
        f.ledger.revoke(&funder(), ids[0]).unwrap();
        let _ = f.ledger.spend(&agent(), ids[0], &merchant(), units(1));
        f.ledger.burn(&funder(), ids[0]).unwrap();

        let events = seen.lock().unwrap();
        let seqs: Vec<u64> = events.iter().map(VoucherEvent::seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert!(matches!(events[0], VoucherEvent::Created { id, .. } if id == ids[0]));
        assert!(matches!(events[1], VoucherEvent::Created { id, .. } if id == ids[1]));
        assert!(matches!(events[2], VoucherEvent::Spent { .. }));
        assert!(matches!(events[3], VoucherEvent::Revoked { .. }));
        assert!(matches!(events[4], VoucherEvent::Burned { refunded, .. } if refunded == units(9)));
    }

    #[test]
    fn batch_creates_every_voucher_with_one_debit() {
        let f = fixture();
        let agents = [addr(1), addr(2), addr(3)];
        let ids = f.ledger.create_batch(&funder(), &agents, units(10), None).unwrap();

        assert_eq!(ids.len(), 3);
        for (id, agent) in ids.iter().zip(agents) {
            assert_eq!(f.ledger.get_remaining(*id).unwrap(), units(10));
            assert_eq!(f.ledger.owner_of(*id).unwrap(), agent);
        }
        assert_eq!(
            f.reserve.calls(),
            vec![ReserveCall::Collect { from: funder(), amount: units(30) }]
        );
        assert_eq!(f.reserve.balance_of(&funder()), units(970));
    }

    #[test]
    fn batch_without_funds_creates_nothing() {
        let f = fixture();
        let agents: Vec<Address> = (1..=11).map(addr).collect();
        let err = f.ledger.create_batch(&funder(), &agents, units(100), None).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(f.ledger.total_supply(), 0);
        assert!(f.registry.is_empty());
        assert_eq!(f.reserve.balance_of(&funder()), units(1_000));
    }

    #[test]
    fn batch_rejects_empty_oversized_and_overflowing_input() {
        let f = fixture();
        let err = f.ledger.create_batch(&funder(), &[], units(1), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);

        let too_many = vec![agent(); f.ledger.params().max_batch_size + 1];
        let err = f.ledger.create_batch(&funder(), &too_many, units(1), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);

        let err = f
            .ledger
            .create_batch(&funder(), &[addr(1), addr(2)], Amount::new(u128::MAX), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);

        let err = f
            .ledger
            .create_batch(&funder(), &[addr(1), Address::ZERO], units(1), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert!(f.reserve.calls().is_empty());
    }

    #[test]
    fn batch_registry_failure_returns_the_debit() {
        let f = fixture();
        // Pre-mint the id the ledger will hand out next.
        f.registry.mint(VoucherId::new(2), addr(9)).unwrap();
        let err = f
            .ledger
            .create_batch(&funder(), &[addr(1), addr(2)], units(10), None)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Registry);
        assert_eq!(f.ledger.total_supply(), 0);
        assert_eq!(f.reserve.balance_of(&funder()), units(1_000));
        assert_eq!(f.reserve.pooled(), Amount::ZERO);
    }

    #[test]
    fn enumeration_by_holder_and_funder() {
        let f = fixture();
        let ids = f
            .ledger
            .create_batch(&funder(), &[agent(), addr(2), agent()], units(1), None)
            .unwrap();
        assert_eq!(f.ledger.balance_of(&agent()), 2);
        assert_eq!(f.ledger.token_of_owner_by_index(&agent(), 1), Some(ids[2]));
        assert_eq!(f.ledger.vouchers_funded_by(&funder()), ids);

        f.ledger.burn(&funder(), ids[1]).unwrap();
        assert_eq!(f.ledger.voucher_ids(), vec![ids[0], ids[2]]);
    }

    #[test]
    fn outstanding_matches_pool() {
        let f = fixture();
        let a = f.ledger.create(&funder(), &agent(), units(50), None).unwrap();
        f.ledger.create(&funder(), &agent(), units(30), None).unwrap();
        f.ledger.spend(&agent(), a, &merchant(), units(20)).unwrap();
        assert_eq!(f.ledger.outstanding(), units(60));
        assert_eq!(f.ledger.outstanding(), f.reserve.pooled());
    }

    #[test]
    fn rejected_operations_are_counted() {
        let f = fixture();
        let _ = f.ledger.spend(&agent(), VoucherId::new(99), &merchant(), units(1));
        let _ = f.ledger.revoke(&funder(), VoucherId::new(99));
        assert_eq!(f.ledger.stats()["rejected"], 2);
        assert!(!f.ledger.is_active(VoucherId::new(99)));
    }

    #[test]
    fn snapshot_restores_records_and_counter() {
        let f = fixture();
        let a = f.ledger.create(&funder(), &agent(), units(10), at(NOW + 100)).unwrap();
        let b = f.ledger.create(&funder(), &agent(), units(20), None).unwrap();
        f.ledger.spend(&agent(), a, &merchant(), units(4)).unwrap();
        f.ledger.revoke(&funder(), b).unwrap();

        let snap = f.ledger.snapshot();
        let restored = VoucherLedger::restore(
            snap,
            LedgerParams::default(),
            f.reserve.clone(),
            f.registry.clone(),
            f.clock.clone(),
        )
        .unwrap();

        assert_eq!(restored.voucher(a).unwrap(), f.ledger.voucher(a).unwrap());
        assert_eq!(restored.voucher(b).unwrap(), f.ledger.voucher(b).unwrap());
        assert_eq!(restored.total_issued(), 2);
    }
}
