// 9.1 engine/core.rs: the Ledger engine. holds the capabilities (store,
// oracle, notification sink), the live config cell, the pending-contract
// registry and the id/time counters. methods take &self: all mutation flows
// through the store's snapshot-and-commit protocol, so the engine itself can
// be shared across threads.

use super::contracts::PendingContract;
use super::results::LedgerError;
use crate::account::Account;
use crate::config::{ConfigError, LedgerConfig};
use crate::events::{DepositEvent, Event, EventId, EventPayload, NotificationSink, NullSink};
use crate::oracle::PriceOracle;
use crate::pnl::{self, AccountStats};
use crate::store::{AccountMutation, AccountSnapshot, AccountStore, CommitError, LedgerOp};
use crate::types::{AccountId, AssetId, PositionId, Price, Quote, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

pub struct Ledger {
    pub(super) store: Arc<dyn AccountStore>,
    pub(super) oracle: Arc<dyn PriceOracle>,
    pub(super) sink: Arc<dyn NotificationSink>,
    pub(super) config: RwLock<LedgerConfig>,
    // Contracts awaiting settlement, ordered by expiry. Owned exclusively by
    // the scheduler once an entry's expiry has passed.
    pub(super) pending: Mutex<BTreeMap<(Timestamp, PositionId), PendingContract>>,
    next_position_id: AtomicU64,
    next_event_id: AtomicU64,
    current_time: AtomicI64,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn AccountStore>,
        oracle: Arc<dyn PriceOracle>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            sink: Arc::new(NullSink),
            config: RwLock::new(config),
            pending: Mutex::new(BTreeMap::new()),
            next_position_id: AtomicU64::new(1),
            next_event_id: AtomicU64::new(1),
            current_time: AtomicI64::new(Timestamp::now().as_millis()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    // Clock. Production runs on wall time seeded at construction; tests and
    // the simulator drive it explicitly.
    pub fn time(&self) -> Timestamp {
        Timestamp::from_millis(self.current_time.load(Ordering::SeqCst))
    }

    pub fn set_time(&self, timestamp: Timestamp) {
        self.current_time.store(timestamp.as_millis(), Ordering::SeqCst);
    }

    pub fn advance_time(&self, millis: i64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }

    // Swap the live config. Pending contracts keep the payout rate and
    // policy captured when they were opened; only orders placed after the
    // reload see the new values.
    pub fn reload_config(&self, config: LedgerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.config.write() = config;
        tracing::info!("ledger config reloaded");
        Ok(())
    }

    pub fn config(&self) -> LedgerConfig {
        self.config.read().clone()
    }

    pub fn create_account(&self) -> AccountId {
        let id = self.store.create(self.time());
        tracing::debug!(account = id.0, "account created");
        id
    }

    pub fn deposit(&self, account_id: AccountId, amount: Quote) -> Result<(), LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::Rejected(
                crate::validator::RejectReason::InvalidAmount,
            ));
        }
        let balance_after = self.try_commit(account_id, |account| {
            let mutation = AccountMutation::new().push(LedgerOp::Deposit(amount));
            Ok((mutation, account.balance.add(amount)))
        })?;

        self.emit(EventPayload::Deposit(DepositEvent {
            account_id,
            amount,
            new_balance: balance_after,
        }));
        Ok(())
    }

    /// Consistent read of one account. Never observes a half-applied
    /// mutation.
    pub fn snapshot(&self, account_id: AccountId) -> Result<AccountSnapshot, LedgerError> {
        self.store.load(account_id).map_err(LedgerError::from_load)
    }

    // Derived views. Unpriceable positions contribute zero rather than
    // failing a read.
    pub fn equity(&self, account_id: AccountId) -> Result<Quote, LedgerError> {
        let snapshot = self.snapshot(account_id)?;
        let prices = self.open_position_prices(&snapshot.account);
        Ok(pnl::equity(&snapshot.account, &prices))
    }

    pub fn total_pnl(&self, account_id: AccountId) -> Result<Quote, LedgerError> {
        let snapshot = self.snapshot(account_id)?;
        let prices = self.open_position_prices(&snapshot.account);
        Ok(pnl::total_pnl(&snapshot.account, &prices))
    }

    pub fn stats(&self, account_id: AccountId) -> Result<AccountStats, LedgerError> {
        let snapshot = self.snapshot(account_id)?;
        Ok(pnl::account_stats(&snapshot.account))
    }

    fn open_position_prices(&self, account: &Account) -> HashMap<AssetId, Price> {
        let mut prices = HashMap::new();
        for position in account.positions.values() {
            if let Ok(price) = self.oracle.current_price(position.asset_id) {
                prices.insert(position.asset_id, price);
            }
        }
        prices
    }

    // 9.2: the commit loop. Load a snapshot, let the caller compute an atomic
    // delta against it, commit with the version read. A stale version means
    // another writer landed first: reload and recompute, so validation always
    // runs against the state it will commit over. Bounded by commit_retries.
    pub(super) fn try_commit<T>(
        &self,
        account_id: AccountId,
        mut attempt: impl FnMut(&Account) -> Result<(AccountMutation, T), LedgerError>,
    ) -> Result<T, LedgerError> {
        let retries = self.config.read().commit_retries;
        for _ in 0..retries {
            let snapshot = self.store.load(account_id).map_err(LedgerError::from_load)?;
            let (mutation, out) = attempt(&snapshot.account)?;
            match self.store.commit(account_id, snapshot.version, mutation) {
                Ok(()) => return Ok(out),
                Err(CommitError::ConcurrentModification) => {
                    tracing::debug!(account = account_id.0, "stale snapshot, retrying commit");
                    continue;
                }
                Err(CommitError::AccountNotFound(id)) => {
                    return Err(LedgerError::AccountNotFound(id))
                }
                Err(CommitError::Rejected(e)) => {
                    return Err(LedgerError::ExecutionFailure(e.to_string()))
                }
            }
        }
        Err(LedgerError::ExecutionFailure(
            "commit retries exhausted".to_string(),
        ))
    }

    pub(super) fn next_position_id(&self) -> PositionId {
        PositionId(self.next_position_id.fetch_add(1, Ordering::Relaxed))
    }

    // Fire-and-forget notification. The sink cannot fail the mutation that
    // produced the event.
    pub(super) fn emit(&self, payload: EventPayload) {
        let id = EventId(self.next_event_id.fetch_add(1, Ordering::Relaxed));
        let event = Event::new(id, self.time(), payload);
        let sink = Arc::clone(&self.sink);
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.deliver(&event))).is_err()
        {
            tracing::warn!(event = id.0, "notification sink panicked, event dropped");
        }
    }
}

impl LedgerError {
    fn from_load(err: CommitError) -> Self {
        match err {
            CommitError::AccountNotFound(id) => LedgerError::AccountNotFound(id),
            other => LedgerError::ExecutionFailure(other.to_string()),
        }
    }
}
