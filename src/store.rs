// 7.0: account persistence capability. snapshot-and-commit protocol: callers
// load a versioned snapshot, compute an atomic delta against it, and commit
// with the version they read. a stale version means another writer got there
// first; the caller reloads and retries. per-account mutexes serialize
// writers on one account while different accounts proceed independently.

use crate::account::{Account, AccountError};
use crate::position::{ClosedTrade, Position};
use crate::types::{AccountId, PositionId, Quote, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// A consistent read of one account. Never observes a half-applied mutation.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account: Account,
    pub version: u64,
}

// 7.1: one step of an atomic delta. A mutation's ops apply in order against
// a working copy; if any fails the account is untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LedgerOp {
    Deposit(Quote),
    Debit(Quote),
    Credit(Quote),
    OpenPosition(Position),
    UpdatePosition(Position),
    RemovePosition(PositionId),
    AppendClosed(ClosedTrade),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountMutation {
    pub ops: Vec<LedgerOp>,
}

impl AccountMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, op: LedgerOp) -> Self {
        self.ops.push(op);
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CommitError {
    #[error("account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("snapshot is stale, reload and retry")]
    ConcurrentModification,

    #[error("mutation rejected: {0}")]
    Rejected(#[from] AccountError),
}

pub trait AccountStore: Send + Sync {
    fn create(&self, timestamp: Timestamp) -> AccountId;

    fn load(&self, account_id: AccountId) -> Result<AccountSnapshot, CommitError>;

    /// Apply an atomic delta computed against the snapshot with
    /// `expected_version`. All ops apply or none do.
    fn commit(
        &self,
        account_id: AccountId,
        expected_version: u64,
        mutation: AccountMutation,
    ) -> Result<(), CommitError>;

    fn accounts(&self) -> Vec<AccountId>;
}

// Applies every op against a working copy. Debit is the only op that can
// reject, and it rejects before writing, so the invariant balance >= 0 holds
// for every committed state.
fn apply_mutation(account: &Account, mutation: &AccountMutation) -> Result<Account, CommitError> {
    let mut next = account.clone();
    for op in &mutation.ops {
        match op {
            LedgerOp::Deposit(amount) => next.deposit(*amount),
            LedgerOp::Debit(amount) => next.debit(*amount)?,
            LedgerOp::Credit(amount) => next.credit(*amount),
            LedgerOp::OpenPosition(position) => next.open_position(position.clone()),
            LedgerOp::UpdatePosition(position) => {
                if next.take_position(position.id).is_none() {
                    return Err(AccountError::PositionNotFound(position.id).into());
                }
                next.open_position(position.clone());
            }
            LedgerOp::RemovePosition(id) => {
                if next.take_position(*id).is_none() {
                    return Err(AccountError::PositionNotFound(*id).into());
                }
            }
            LedgerOp::AppendClosed(trade) => next.record_closed(trade.clone()),
        }
    }
    Ok(next)
}

#[derive(Debug)]
struct Versioned {
    account: Account,
    version: u64,
}

/// In-memory store. Outer map under a read-write lock, one mutex per
/// account; writers on the same account serialize, different accounts never
/// contend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Versioned>>>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, account_id: AccountId) -> Result<Arc<Mutex<Versioned>>, CommitError> {
        self.accounts
            .read()
            .get(&account_id)
            .cloned()
            .ok_or(CommitError::AccountNotFound(account_id))
    }
}

impl AccountStore for InMemoryStore {
    fn create(&self, timestamp: Timestamp) -> AccountId {
        let id = AccountId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let versioned = Versioned {
            account: Account::new(id, timestamp),
            version: 0,
        };
        self.accounts.write().insert(id, Arc::new(Mutex::new(versioned)));
        id
    }

    fn load(&self, account_id: AccountId) -> Result<AccountSnapshot, CommitError> {
        let entry = self.entry(account_id)?;
        let guard = entry.lock();
        Ok(AccountSnapshot {
            account: guard.account.clone(),
            version: guard.version,
        })
    }

    fn commit(
        &self,
        account_id: AccountId,
        expected_version: u64,
        mutation: AccountMutation,
    ) -> Result<(), CommitError> {
        let entry = self.entry(account_id)?;
        let mut guard = entry.lock();

        if guard.version != expected_version {
            return Err(CommitError::ConcurrentModification);
        }

        let next = apply_mutation(&guard.account, &mutation)?;
        guard.account = next;
        guard.version += 1;
        Ok(())
    }

    fn accounts(&self) -> Vec<AccountId> {
        self.accounts.read().keys().copied().collect()
    }
}
