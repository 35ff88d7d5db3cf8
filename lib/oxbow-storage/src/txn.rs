//! Transaction manager: session-scoped transactions with monotonic ids and
//! commit timestamps.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// First transaction id. Chosen far above any realistic row count so that a
/// version stamp can be classified as "transaction id" or "commit id" by
/// comparison alone.
pub const TRANSACTION_ID_START: u64 = 1 << 62;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// MVCC snapshot handed to readers: everything committed at or before
/// `start_time` is visible, plus the reader's own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub start_time: u64,
    pub transaction_id: u64,
}

impl Snapshot {
    /// Snapshot that sees every committed write and owns none.
    pub fn latest(manager: &TransactionManager) -> Snapshot {
        Snapshot {
            start_time: manager.current_timestamp(),
            transaction_id: 0,
        }
    }
}

#[derive(Debug)]
pub struct Transaction {
    id: u64,
    start_time: u64,
    session: SessionId,
    commit_id: AtomicU64,
    state: Mutex<TransactionState>,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Commit id, or 0 while the transaction is still active.
    pub fn commit_id(&self) -> u64 {
        self.commit_id.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            start_time: self.start_time,
            transaction_id: self.id,
        }
    }
}

#[derive(Debug, Default)]
struct ActiveTransactions {
    by_session: HashMap<SessionId, Arc<Transaction>>,
    /// start time -> number of active transactions that own it
    start_times: BTreeMap<u64, usize>,
}

/// Thread-safe issuer of transaction ids and commit timestamps.
#[derive(Debug)]
pub struct TransactionManager {
    next_transaction_id: AtomicU64,
    current_timestamp: AtomicU64,
    active: Mutex<ActiveTransactions>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager {
            next_transaction_id: AtomicU64::new(TRANSACTION_ID_START),
            current_timestamp: AtomicU64::new(1),
            active: Mutex::new(ActiveTransactions::default()),
        }
    }

    /// Begin a transaction for `session`, or return the one it already has.
    pub fn begin_transaction(&self, session: SessionId) -> Arc<Transaction> {
        let mut active = self.active.lock();
        if let Some(txn) = active.by_session.get(&session) {
            return Arc::clone(txn);
        }
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        let start_time = self.current_timestamp.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction {
            id,
            start_time,
            session,
            commit_id: AtomicU64::new(0),
            state: Mutex::new(TransactionState::Active),
        });
        active.by_session.insert(session, Arc::clone(&txn));
        *active.start_times.entry(start_time).or_insert(0) += 1;
        trace!(txn_id = id, start_time, session, "began transaction");
        txn
    }

    /// Commit the session's transaction and return the commit id; 0 when the
    /// session has no active transaction.
    pub fn commit(&self, session: SessionId) -> u64 {
        let mut active = self.active.lock();
        let Some(txn) = active.by_session.remove(&session) else {
            return 0;
        };
        let commit_id = self.current_timestamp.fetch_add(1, Ordering::SeqCst);
        txn.commit_id.store(commit_id, Ordering::Release);
        *txn.state.lock() = TransactionState::Committed;
        remove_start_time(&mut active, txn.start_time);
        trace!(txn_id = txn.id, commit_id, "committed transaction");
        commit_id
    }

    pub fn abort(&self, session: SessionId) {
        let mut active = self.active.lock();
        let Some(txn) = active.by_session.remove(&session) else {
            return;
        };
        *txn.state.lock() = TransactionState::Aborted;
        remove_start_time(&mut active, txn.start_time);
        trace!(txn_id = txn.id, "aborted transaction");
    }

    pub fn find_transaction(&self, session: SessionId) -> Option<Arc<Transaction>> {
        self.active.lock().by_session.get(&session).cloned()
    }

    pub fn has_active_transaction(&self, session: SessionId) -> bool {
        self.active.lock().by_session.contains_key(&session)
    }

    pub fn has_active_transactions(&self) -> bool {
        !self.active.lock().by_session.is_empty()
    }

    /// Minimum start time across active transactions, or the current
    /// timestamp when none are active. Garbage collection may drop versions
    /// older than this.
    pub fn lowest_active_start_time(&self) -> u64 {
        let active = self.active.lock();
        match active.start_times.keys().next() {
            Some(&start_time) => start_time,
            None => self.current_timestamp.load(Ordering::SeqCst),
        }
    }

    pub fn current_timestamp(&self) -> u64 {
        self.current_timestamp.load(Ordering::SeqCst)
    }
}

fn remove_start_time(active: &mut ActiveTransactions, start_time: u64) {
    if let Some(count) = active.start_times.get_mut(&start_time) {
        *count -= 1;
        if *count == 0 {
            active.start_times.remove(&start_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_commit_ids_are_strictly_monotonic() {
        let manager = TransactionManager::new();
        let mut last_id = 0;
        let mut last_commit = 0;
        for session in 0..10 {
            let txn = manager.begin_transaction(session);
            assert!(txn.id() > last_id.max(TRANSACTION_ID_START - 1));
            last_id = txn.id();
            let commit_id = manager.commit(session);
            assert!(commit_id > last_commit);
            assert!(commit_id > txn.start_time());
            last_commit = commit_id;
        }
    }

    #[test]
    fn begin_is_idempotent_per_session() {
        let manager = TransactionManager::new();
        let a = manager.begin_transaction(7);
        let b = manager.begin_transaction(7);
        assert_eq!(a.id(), b.id());
        assert!(manager.has_active_transaction(7));
    }

    #[test]
    fn commit_unknown_session_returns_zero() {
        let manager = TransactionManager::new();
        assert_eq!(manager.commit(99), 0);
    }

    #[test]
    fn abort_removes_from_active_sets() {
        let manager = TransactionManager::new();
        let txn = manager.begin_transaction(1);
        manager.abort(1);
        assert!(!manager.has_active_transaction(1));
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(txn.commit_id(), 0);
    }

    #[test]
    fn lowest_active_start_time() {
        let manager = TransactionManager::new();
        let t1 = manager.begin_transaction(1);
        let _t2 = manager.begin_transaction(2);
        assert_eq!(manager.lowest_active_start_time(), t1.start_time());
        manager.commit(1);
        assert!(manager.lowest_active_start_time() > t1.start_time());
        manager.commit(2);
        // no active transactions: falls back to the current timestamp
        assert_eq!(
            manager.lowest_active_start_time(),
            manager.current_timestamp()
        );
    }
}
