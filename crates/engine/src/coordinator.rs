//! Transaction coordinator
//!
//! Wraps [`TransactionManager`] with lifecycle bookkeeping: active
//! transaction count, started/committed/aborted/retried totals, and the
//! start versions of unfinished transactions.
//!
//! The oldest unfinished start version is the GC horizon: no live snapshot
//! reads below it, so versions older than the newest one at or before it can
//! be pruned.

use folio_concurrency::{TransactionContext, TransactionManager};
use folio_core::{LibraryError, LibraryResult, SnapshotView, Storage};
use folio_storage::ShardedStore;
use parking_lot::Mutex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Begins and commits transactions and keeps their counters
#[derive(Debug)]
pub struct TransactionCoordinator {
    manager: TransactionManager,
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
    total_retries: AtomicU64,
    /// Start version -> number of unfinished transactions reading at it
    active_snapshots: Mutex<BTreeMap<u64, usize>>,
}

impl TransactionCoordinator {
    /// Create a coordinator whose versions continue from `initial_version`
    pub fn new(initial_version: u64) -> Self {
        Self {
            manager: TransactionManager::new(initial_version),
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            active_snapshots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Begin a transaction over a fresh snapshot of `storage`
    pub fn start_transaction(&self, storage: &Arc<ShardedStore>) -> TransactionContext {
        let txn_id = self.manager.next_txn_id();
        // Registered under the lock so a concurrent horizon read cannot
        // land between taking the snapshot and pinning its version.
        let snapshot = {
            let mut active = self.active_snapshots.lock();
            let snapshot = storage.snapshot();
            *active.entry(snapshot.version()).or_insert(0) += 1;
            snapshot
        };
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);

        debug!(target: "folio::txn", txn_id, start_version = snapshot.version(), "Transaction started");

        TransactionContext::with_snapshot(txn_id, Box::new(snapshot))
    }

    /// Validate and apply, updating counters either way
    pub fn commit<S: Storage + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> LibraryResult<u64> {
        match self.manager.commit(txn, store) {
            Ok(version) => {
                self.record_commit(txn.start_version);
                debug!(target: "folio::txn", txn_id = txn.txn_id, version, "Transaction committed");
                Ok(version)
            }
            Err(e) => {
                self.record_abort(txn.start_version);
                debug!(target: "folio::txn", txn_id = txn.txn_id, error = %e, "Transaction aborted at commit");
                Err(LibraryError::from(e))
            }
        }
    }

    /// Count a successful commit and release its snapshot
    pub fn record_commit(&self, start_version: u64) {
        self.release_snapshot(start_version);
        self.decrement_active();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an abort and release its snapshot
    pub fn record_abort(&self, start_version: u64) {
        self.release_snapshot(start_version);
        self.decrement_active();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn release_snapshot(&self, start_version: u64) {
        let mut active = self.active_snapshots.lock();
        if let Entry::Occupied(mut entry) = active.entry(start_version) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }

    /// Oldest version a live snapshot may still read
    ///
    /// The store's current version when no transaction is unfinished.
    pub fn gc_horizon(&self, storage: &ShardedStore) -> u64 {
        let active = self.active_snapshots.lock();
        active
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| storage.version())
    }

    /// Count a conflict retry
    pub fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement_active(&self) {
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    /// Latest allocated commit version
    pub fn current_version(&self) -> u64 {
        self.manager.current_version()
    }

    /// Point-in-time counters
    pub fn metrics(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);
        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of transaction counters
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// Transactions begun but not yet finished
    pub active_count: u64,
    /// Transactions begun
    pub total_started: u64,
    /// Transactions committed
    pub total_committed: u64,
    /// Transactions aborted by conflict or by the closure
    pub total_aborted: u64,
    /// Conflict retries performed by the retry loop
    pub total_retries: u64,
    /// committed / started
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Committed plus aborted
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// aborted / started
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{BookId, Key, Value};

    #[test]
    fn test_new_coordinator_has_zero_metrics() {
        let coordinator = TransactionCoordinator::new(0);
        let m = coordinator.metrics();
        assert_eq!(m.total_started, 0);
        assert_eq!(m.commit_rate, 0.0);
        assert_eq!(m.abort_rate(), 0.0);
    }

    #[test]
    fn test_commit_updates_metrics() {
        let storage = Arc::new(ShardedStore::new());
        let coordinator = TransactionCoordinator::new(0);

        let mut txn = coordinator.start_transaction(&storage);
        txn.put(Key::book(BookId::new(1)), Value::Ref(1)).unwrap();
        assert_eq!(coordinator.metrics().active_count, 1);
        let version = coordinator.commit(&mut txn, storage.as_ref()).unwrap();
        assert_eq!(version, 1);

        let m = coordinator.metrics();
        assert_eq!(m.active_count, 0);
        assert_eq!(m.total_committed, 1);
        assert_eq!(m.commit_rate, 1.0);
    }

    #[test]
    fn test_gc_horizon_follows_oldest_open_transaction() {
        let storage = Arc::new(ShardedStore::new());
        let coordinator = TransactionCoordinator::new(0);
        let key = Key::book(BookId::new(1));
        assert_eq!(coordinator.gc_horizon(&storage), 0);

        let mut old = coordinator.start_transaction(&storage);
        for n in 1..=3 {
            let mut txn = coordinator.start_transaction(&storage);
            txn.put(key.clone(), Value::Ref(n)).unwrap();
            coordinator.commit(&mut txn, storage.as_ref()).unwrap();
        }
        assert_eq!(coordinator.gc_horizon(&storage), 0);

        let mut newer = coordinator.start_transaction(&storage);
        assert_eq!(newer.start_version, 3);
        old.mark_aborted("done").unwrap();
        coordinator.record_abort(old.start_version);
        assert_eq!(coordinator.gc_horizon(&storage), 3);

        coordinator.commit(&mut newer, storage.as_ref()).unwrap();
        assert_eq!(coordinator.gc_horizon(&storage), 3);
        assert_eq!(coordinator.metrics().active_count, 0);
    }

    #[test]
    fn test_conflict_counts_as_abort() {
        let storage = Arc::new(ShardedStore::new());
        let coordinator = TransactionCoordinator::new(0);
        let key = Key::book(BookId::new(1));

        let mut t1 = coordinator.start_transaction(&storage);
        let mut t2 = coordinator.start_transaction(&storage);
        t1.get(&key).unwrap();
        t2.get(&key).unwrap();
        t1.put(key.clone(), Value::Ref(1)).unwrap();
        t2.put(key, Value::Ref(2)).unwrap();

        coordinator.commit(&mut t1, storage.as_ref()).unwrap();
        let err = coordinator.commit(&mut t2, storage.as_ref()).unwrap_err();
        assert!(err.is_conflict());

        let m = coordinator.metrics();
        assert_eq!(m.total_completed(), 2);
        assert_eq!(m.total_aborted, 1);
        assert_eq!(m.abort_rate(), 0.5);
    }
}
