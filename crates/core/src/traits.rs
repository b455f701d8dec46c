//! Core traits for storage and snapshot abstraction
//!
//! The concurrency layer reads through [`SnapshotView`] and commits through
//! [`Storage`]; neither knows which backend sits underneath.

use crate::contract::{VersionedEntry, VersionedValue};
use crate::error::LibraryResult;
use crate::types::Key;
use crate::value::Value;

/// Storage abstraction
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads.
pub trait Storage: Send + Sync {
    /// Latest live value for a key
    fn get(&self, key: &Key) -> LibraryResult<Option<VersionedValue>>;

    /// Version of the newest entry for a key, tombstones included
    ///
    /// Returns 0 when the key has never been written. Used by commit-time
    /// validation.
    fn latest_version(&self, key: &Key) -> LibraryResult<u64>;

    /// Version of the most recent committed batch
    fn current_version(&self) -> u64;

    /// Apply a committed write set atomically at `version`
    ///
    /// Readers either see the whole batch or none of it.
    fn apply_batch(&self, writes: Vec<(Key, Value)>, deletes: Vec<Key>, version: u64)
        -> LibraryResult<()>;
}

/// Point-in-time read view
///
/// A snapshot taken at version V observes exactly the batches committed at
/// or before V.
pub trait SnapshotView: Send + Sync {
    /// Version this snapshot was taken at
    fn version(&self) -> u64;

    /// Visible entry for a key, tombstones included
    fn get_entry(&self, key: &Key) -> LibraryResult<Option<VersionedEntry>>;

    /// Visible live value for a key
    fn get(&self, key: &Key) -> LibraryResult<Option<VersionedValue>> {
        Ok(self.get_entry(key)?.and_then(VersionedEntry::into_live))
    }

    /// Every visible live entry under `prefix`, in key order
    fn scan_prefix(&self, prefix: &Key) -> LibraryResult<Vec<(Key, VersionedValue)>>;
}
