//! Sharded MVCC storage
//!
//! DashMap keyed by [`TypeTag`], FxHashMap within each shard. Every key maps
//! to a [`VersionChain`] holding its versions newest-first; deletes push a
//! tombstone instead of removing the chain, so a snapshot taken before the
//! delete still sees the old value and commit validation can tell "never
//! written" (version 0) from "deleted at version N".
//!
//! # Version Handling
//!
//! A batch is written at version V and only then is the store version raised
//! to V. Every read path filters by the store or snapshot version, so a
//! partially applied batch is never observed.

use chrono::Utc;
use dashmap::DashMap;
use folio_core::{
    Key, LibraryResult, SnapshotView, Storage, TypeTag, Value, VersionedEntry, VersionedValue,
};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::stored_value::StoredValue;

/// Version chain for one key, newest first
///
/// VecDeque gives O(1) push_front for keys that are rewritten often (book
/// stock counters).
#[derive(Debug, Clone)]
pub struct VersionChain {
    versions: VecDeque<StoredValue>,
}

impl VersionChain {
    /// Create a chain with a single version
    pub fn new(value: StoredValue) -> Self {
        let mut versions = VecDeque::with_capacity(4);
        versions.push_front(value);
        Self { versions }
    }

    /// Add a version newer than every existing one
    #[inline]
    pub fn push(&mut self, value: StoredValue) {
        debug_assert!(
            self.latest().map_or(true, |sv| sv.version() < value.version()),
            "versions must be pushed in increasing order"
        );
        self.versions.push_front(value);
    }

    /// Newest version at or before `max_version`
    pub fn get_at_version(&self, max_version: u64) -> Option<&StoredValue> {
        self.versions.iter().find(|sv| sv.version() <= max_version)
    }

    /// Newest version, tombstones included
    #[inline]
    pub fn latest(&self) -> Option<&StoredValue> {
        self.versions.front()
    }

    /// Drop versions no snapshot at or after `min_version` can observe
    ///
    /// Keeps every version newer than `min_version` plus the newest one at or
    /// before it.
    pub fn gc(&mut self, min_version: u64) -> usize {
        let Some(keep_through) = self
            .versions
            .iter()
            .position(|sv| sv.version() <= min_version)
        else {
            return 0;
        };
        let removed = self.versions.len() - keep_through - 1;
        self.versions.truncate(keep_through + 1);
        removed
    }

    /// Number of versions stored
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }
}

/// One record family's keys
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) data: FxHashMap<Key, VersionChain>,
}

impl Shard {
    /// Create an empty shard
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys, tombstoned keys included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no key was ever written
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sharded storage - DashMap by TypeTag, FxHashMap within
///
/// # Thread Safety
///
/// - reads take a shared guard on one shard
/// - `apply_batch` locks one shard at a time
/// - callers serialize `apply_batch` (the transaction manager holds its
///   commit lock), so versions arrive in order
pub struct ShardedStore {
    shards: DashMap<TypeTag, Shard>,
    version: AtomicU64,
}

impl ShardedStore {
    /// Create an empty store at version 0
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Latest fully applied version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of non-empty shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Keys across all shards, tombstoned keys included
    pub fn total_entries(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }

    fn push(&self, key: Key, value: StoredValue) {
        let mut shard = self.shards.entry(key.type_tag).or_default();
        if let Some(chain) = shard.data.get_mut(&key) {
            chain.push(value);
        } else {
            shard.data.insert(key, VersionChain::new(value));
        }
    }

    fn entry_at(&self, key: &Key, max_version: u64) -> Option<VersionedEntry> {
        self.shards.get(&key.type_tag).and_then(|shard| {
            shard
                .data
                .get(key)
                .and_then(|chain| chain.get_at_version(max_version))
                .map(|sv| sv.entry().clone())
        })
    }

    fn scan_at(&self, prefix: &Key, max_version: u64) -> Vec<(Key, VersionedValue)> {
        self.shards
            .get(&prefix.type_tag)
            .map(|shard| {
                let mut results: Vec<_> = shard
                    .data
                    .iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .filter_map(|(k, chain)| {
                        chain
                            .get_at_version(max_version)
                            .and_then(StoredValue::to_live)
                            .map(|vv| (k.clone(), vv))
                    })
                    .collect();
                results.sort_by(|(a, _), (b, _)| a.cmp(b));
                results
            })
            .unwrap_or_default()
    }

    /// Point-in-time view at the current version
    ///
    /// O(1): an Arc clone and an atomic load.
    #[inline]
    pub fn snapshot(self: &Arc<Self>) -> ShardedSnapshot {
        ShardedSnapshot {
            version: self.version(),
            store: Arc::clone(self),
        }
    }

    /// Prune versions older than `min_version` across every shard
    ///
    /// Safe only when no live snapshot is older than `min_version`.
    pub fn gc_versions_before(&self, min_version: u64) -> usize {
        let mut removed = 0;
        for mut shard in self.shards.iter_mut() {
            for chain in shard.value_mut().data.values_mut() {
                removed += chain.gc(min_version);
            }
        }
        debug!(target: "folio::storage", min_version, removed, "Pruned version chains");
        removed
    }

    /// Prune the chains of `keys` only
    ///
    /// Same bound as [`gc_versions_before`](Self::gc_versions_before); used
    /// after a commit to trim the keys it just extended.
    pub fn gc_keys<'a, I>(&self, keys: I, min_version: u64) -> usize
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let mut removed = 0;
        for key in keys {
            if let Some(mut shard) = self.shards.get_mut(&key.type_tag) {
                if let Some(chain) = shard.data.get_mut(key) {
                    removed += chain.gc(min_version);
                }
            }
        }
        removed
    }

    /// Versions held for `key`, tombstones included
    pub fn version_count(&self, key: &Key) -> usize {
        self.shards
            .get(&key.type_tag)
            .and_then(|shard| shard.data.get(key).map(VersionChain::version_count))
            .unwrap_or(0)
    }
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStore")
            .field("shard_count", &self.shard_count())
            .field("version", &self.version())
            .field("total_entries", &self.total_entries())
            .finish()
    }
}

impl Storage for ShardedStore {
    fn get(&self, key: &Key) -> LibraryResult<Option<VersionedValue>> {
        Ok(self
            .entry_at(key, self.version())
            .and_then(VersionedEntry::into_live))
    }

    fn latest_version(&self, key: &Key) -> LibraryResult<u64> {
        Ok(self
            .shards
            .get(&key.type_tag)
            .and_then(|shard| shard.data.get(key).and_then(|c| c.latest().map(|sv| sv.version())))
            .unwrap_or(0))
    }

    fn current_version(&self) -> u64 {
        self.version()
    }

    fn apply_batch(
        &self,
        writes: Vec<(Key, Value)>,
        deletes: Vec<Key>,
        version: u64,
    ) -> LibraryResult<()> {
        let timestamp = Utc::now();
        for (key, value) in writes {
            self.push(key, StoredValue::live(value, version, timestamp));
        }
        for key in deletes {
            self.push(key, StoredValue::tombstone(version, timestamp));
        }
        self.version.fetch_max(version, Ordering::AcqRel);
        Ok(())
    }
}

/// Snapshot of a [`ShardedStore`] at a fixed version
///
/// Reads filter version chains by the captured version, so later commits are
/// invisible. Cloning is cheap.
#[derive(Clone)]
pub struct ShardedSnapshot {
    version: u64,
    store: Arc<ShardedStore>,
}

impl ShardedSnapshot {
    /// Store the snapshot reads from
    pub fn store(&self) -> &Arc<ShardedStore> {
        &self.store
    }
}

impl std::fmt::Debug for ShardedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedSnapshot")
            .field("version", &self.version)
            .finish()
    }
}

impl SnapshotView for ShardedSnapshot {
    fn version(&self) -> u64 {
        self.version
    }

    fn get_entry(&self, key: &Key) -> LibraryResult<Option<VersionedEntry>> {
        Ok(self.store.entry_at(key, self.version))
    }

    fn scan_prefix(&self, prefix: &Key) -> LibraryResult<Vec<(Key, VersionedValue)>> {
        Ok(self.store.scan_at(prefix, self.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{BookId, LoanId, PatronId};

    fn store() -> Arc<ShardedStore> {
        Arc::new(ShardedStore::new())
    }

    fn write(store: &ShardedStore, key: Key, value: Value) -> u64 {
        let version = store.version() + 1;
        store.apply_batch(vec![(key, value)], vec![], version).unwrap();
        version
    }

    fn delete(store: &ShardedStore, key: Key) -> u64 {
        let version = store.version() + 1;
        store.apply_batch(vec![], vec![key], version).unwrap();
        version
    }

    #[test]
    fn test_get_returns_latest() {
        let s = store();
        let key = Key::isbn("9780000000001");
        write(&s, key.clone(), Value::Ref(1));
        write(&s, key.clone(), Value::Ref(2));
        let got = s.get(&key).unwrap().unwrap();
        assert_eq!(got.value, Value::Ref(2));
        assert_eq!(got.version.as_u64(), 2);
    }

    #[test]
    fn test_missing_key_has_version_zero() {
        let s = store();
        assert_eq!(s.latest_version(&Key::book(BookId::new(1))).unwrap(), 0);
        assert!(s.get(&Key::book(BookId::new(1))).unwrap().is_none());
    }

    #[test]
    fn test_delete_leaves_tombstone_version() {
        let s = store();
        let key = Key::isbn("9780000000001");
        write(&s, key.clone(), Value::Ref(1));
        let deleted_at = delete(&s, key.clone());
        assert!(s.get(&key).unwrap().is_none());
        assert_eq!(s.latest_version(&key).unwrap(), deleted_at);
    }

    #[test]
    fn test_snapshot_does_not_see_later_writes() {
        let s = store();
        let key = Key::isbn("9780000000001");
        write(&s, key.clone(), Value::Ref(1));
        let snap = s.snapshot();
        write(&s, key.clone(), Value::Ref(2));
        delete(&s, Key::isbn("9780000000001"));

        assert_eq!(snap.get(&key).unwrap().unwrap().value, Value::Ref(1));
        assert!(s.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_sees_tombstone_entry() {
        let s = store();
        let key = Key::isbn("9780000000001");
        write(&s, key.clone(), Value::Ref(1));
        let deleted_at = delete(&s, key.clone());
        let snap = s.snapshot();
        let entry = snap.get_entry(&key).unwrap().unwrap();
        assert!(entry.is_tombstone());
        assert_eq!(entry.version.as_u64(), deleted_at);
        assert!(snap.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_uncommitted_version_is_invisible() {
        let s = store();
        let key = Key::isbn("9780000000001");
        // Entry pushed at a version above the store version, as mid-batch.
        s.push(key.clone(), StoredValue::live(Value::Ref(1), 5, Utc::now()));
        assert!(s.get(&key).unwrap().is_none());
        assert!(s.snapshot().get(&key).unwrap().is_none());
    }

    #[test]
    fn test_scan_prefix_is_sorted_and_scoped() {
        let s = store();
        let book = BookId::new(3);
        let version = 1;
        s.apply_batch(
            vec![
                (Key::book_loan(book, LoanId::new(20)), Value::Ref(20)),
                (Key::book_loan(book, LoanId::new(4)), Value::Ref(4)),
                (Key::book_loan(BookId::new(9), LoanId::new(1)), Value::Ref(1)),
                (Key::patron_loan(PatronId::new(3), LoanId::new(7)), Value::Ref(7)),
            ],
            vec![],
            version,
        )
        .unwrap();
        delete(&s, Key::book_loan(book, LoanId::new(20)));
        write(&s, Key::book_loan(book, LoanId::new(11)), Value::Ref(11));

        let ids: Vec<u64> = s
            .snapshot()
            .scan_prefix(&Key::book_loans(book))
            .unwrap()
            .into_iter()
            .map(|(_, vv)| vv.value.as_ref_id().unwrap())
            .collect();
        assert_eq!(ids, vec![4, 11]);
    }

    #[test]
    fn test_gc_keeps_visible_versions() {
        let s = store();
        let key = Key::isbn("9780000000001");
        for i in 1..=5 {
            write(&s, key.clone(), Value::Ref(i));
        }
        let old = ShardedSnapshot {
            version: 3,
            store: Arc::clone(&s),
        };
        let removed = s.gc_versions_before(3);
        assert_eq!(removed, 2);
        assert_eq!(old.get(&key).unwrap().unwrap().value, Value::Ref(3));
        assert_eq!(s.get(&key).unwrap().unwrap().value, Value::Ref(5));
    }

    #[test]
    fn test_gc_keys_leaves_other_keys_alone() {
        let s = store();
        let hot = Key::book(BookId::new(1));
        let cold = Key::book(BookId::new(2));
        for i in 1..=4 {
            write(&s, hot.clone(), Value::Ref(i));
            write(&s, cold.clone(), Value::Ref(i));
        }
        let removed = s.gc_keys([&hot], s.version());
        assert_eq!(removed, 3);
        assert_eq!(s.version_count(&hot), 1);
        assert_eq!(s.version_count(&cold), 4);
        assert_eq!(s.get(&hot).unwrap().unwrap().value, Value::Ref(4));
        assert_eq!(s.version_count(&Key::book(BookId::new(3))), 0);
    }

    #[test]
    fn test_version_chain_gc_without_old_versions() {
        let mut chain = VersionChain::new(StoredValue::live(Value::Ref(1), 10, Utc::now()));
        assert_eq!(chain.gc(5), 0);
        assert_eq!(chain.version_count(), 1);
    }

    #[test]
    fn test_concurrent_readers_during_writes() {
        use std::thread;

        let s = store();
        let key = Key::isbn("9780000000001");
        write(&s, key.clone(), Value::Ref(0));

        let writer = {
            let s = Arc::clone(&s);
            let key = key.clone();
            thread::spawn(move || {
                for i in 1..=200 {
                    write(&s, key.clone(), Value::Ref(i));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&s);
                let key = key.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let snap = s.snapshot();
                        let first = snap.get(&key).unwrap().unwrap().value;
                        let second = snap.get(&key).unwrap().unwrap().value;
                        assert_eq!(first, second);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(s.get(&key).unwrap().unwrap().value, Value::Ref(200));
    }
}
