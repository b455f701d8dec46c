//! Concurrent/Multi-threaded Tests for folio-concurrency
//!
//! These tests verify correct behavior under real concurrent execution:
//!
//! 1. **TOCTOU Prevention** - The commit lock serializes validate + apply
//! 2. **Version Monotonicity** - Commit versions are unique and increasing
//! 3. **First-Committer-Wins** - Conflicts are detected with real races
//! 4. **CAS** - Expected-absent claims admit one winner

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use folio_concurrency::{CommitError, TransactionContext, TransactionManager};
use folio_core::{BookId, Key, Storage, Value};
use folio_storage::ShardedStore;
use parking_lot::Mutex;

// ============================================================================
// Test Helpers
// ============================================================================

fn key(n: u64) -> Key {
    Key::book(BookId::new(n))
}

fn begin(manager: &TransactionManager, store: &Arc<ShardedStore>) -> TransactionContext {
    TransactionContext::with_snapshot(manager.next_txn_id(), Box::new(store.snapshot()))
}

fn read_counter(txn: &mut TransactionContext) -> u64 {
    txn.get(&key(0))
        .unwrap()
        .and_then(|v| v.as_ref_id())
        .unwrap_or(0)
}

// ============================================================================
// TOCTOU Prevention
// ============================================================================

/// Two transactions read the same snapshot and write the same key:
/// exactly one commits and storage holds the winner's value.
#[test]
fn test_commit_lock_prevents_toctou_race() {
    for _ in 0..50 {
        let store = Arc::new(ShardedStore::new());
        let manager = Arc::new(TransactionManager::new(0));
        let barrier = Arc::new(Barrier::new(2));
        let winners = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (1..=2u64)
            .map(|i| {
                let store = Arc::clone(&store);
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    let mut txn = begin(&manager, &store);
                    txn.get(&key(1)).unwrap();
                    txn.put(key(1), Value::Ref(i)).unwrap();
                    barrier.wait();
                    match manager.commit(&mut txn, store.as_ref()) {
                        Ok(_) => winners.lock().push(i),
                        Err(CommitError::ValidationFailed(_)) => {}
                        Err(e) => panic!("unexpected commit error: {e}"),
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let winners = winners.lock();
        assert_eq!(winners.len(), 1);
        let stored = store.get(&key(1)).unwrap().unwrap().value;
        assert_eq!(stored, Value::Ref(winners[0]));
    }
}

// ============================================================================
// Version Monotonicity
// ============================================================================

/// Blind writes from many threads get distinct versions
#[test]
fn test_commit_versions_unique() {
    const THREADS: usize = 8;
    const PER_THREAD: u64 = 50;
    let store = Arc::new(ShardedStore::new());
    let manager = Arc::new(TransactionManager::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));
    let versions = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..THREADS as u64)
        .map(|t| {
            let store = Arc::clone(&store);
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let versions = Arc::clone(&versions);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let mut txn = begin(&manager, &store);
                    txn.put(key(t * PER_THREAD + i), Value::Ref(i)).unwrap();
                    let v = manager.commit(&mut txn, store.as_ref()).unwrap();
                    assert!(versions.lock().insert(v), "version {v} reused");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total = THREADS as u64 * PER_THREAD;
    assert_eq!(versions.lock().len() as u64, total);
    assert_eq!(manager.current_version(), total);
    assert_eq!(store.version(), total);
}

// ============================================================================
// First-Committer-Wins under retry
// ============================================================================

/// Read-modify-write increments with manual retry never lose an update
#[test]
fn test_no_lost_updates() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;
    let store = Arc::new(ShardedStore::new());
    let manager = Arc::new(TransactionManager::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let manager = Arc::clone(&manager);
            let conflicts = Arc::clone(&conflicts);
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    loop {
                        let mut txn = begin(&manager, &store);
                        let n = read_counter(&mut txn);
                        txn.put(key(0), Value::Ref(n + 1)).unwrap();
                        match manager.commit(&mut txn, store.as_ref()) {
                            Ok(_) => break,
                            Err(CommitError::ValidationFailed(_)) => {
                                conflicts.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => panic!("unexpected commit error: {e}"),
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut txn = begin(&manager, &store);
    assert_eq!(read_counter(&mut txn), (THREADS * PER_THREAD) as u64);
}

// ============================================================================
// CAS
// ============================================================================

/// Many threads claim one absent key with CAS(expected = 0): one winner
#[test]
fn test_cas_claim_has_one_winner() {
    const THREADS: usize = 6;
    let store = Arc::new(ShardedStore::new());
    let manager = Arc::new(TransactionManager::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));
    let wins = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS as u64)
        .map(|i| {
            let store = Arc::clone(&store);
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let wins = Arc::clone(&wins);
            thread::spawn(move || {
                let mut txn = begin(&manager, &store);
                txn.cas(key(9), 0, Value::Ref(i)).unwrap();
                barrier.wait();
                if manager.commit(&mut txn, store.as_ref()).is_ok() {
                    wins.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::Relaxed), 1);
    assert!(store.get(&key(9)).unwrap().is_some());
}
