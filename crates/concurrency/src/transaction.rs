//! Transaction context for OCC
//!
//! A `TransactionContext` is one unit of work: it reads through a snapshot,
//! buffers every write, and records the version of every key it read so the
//! commit can be validated against concurrent writers.
//!
//! Read-your-writes: `get` consults the write set, then the delete set, then
//! the snapshot. Only snapshot reads enter the read set.

use crate::validation::{validate_transaction, ValidationResult};
use folio_core::{Key, LibraryError, LibraryResult, SnapshotView, Storage, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// Error type for commit failures
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    /// Read-set or CAS-set validation found concurrent modifications
    #[error("commit failed: {} conflict(s)", .0.conflict_count())]
    ValidationFailed(ValidationResult),

    /// The transaction was not Active when commit was requested
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Storage rejected the batch
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<CommitError> for LibraryError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => LibraryError::conflict(result.summary()),
            CommitError::InvalidState(state) => LibraryError::TransactionNotActive { state },
            CommitError::Storage(message) => LibraryError::storage(message),
        }
    }
}

/// Result of applying a committed transaction to storage
///
/// All keys in one transaction share the same commit version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    /// Version assigned to every write in the batch
    pub commit_version: u64,
    /// Puts applied
    pub puts_applied: usize,
    /// Deletes applied
    pub deletes_applied: usize,
    /// CAS writes applied
    pub cas_applied: usize,
}

impl ApplyResult {
    /// Total number of operations applied
    pub fn total_operations(&self) -> usize {
        self.puts_applied + self.deletes_applied + self.cas_applied
    }
}

/// Buffered operations that an abort would discard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Buffered puts
    pub puts: usize,
    /// Buffered deletes
    pub deletes: usize,
    /// Buffered CAS operations
    pub cas: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.puts + self.deletes + self.cas
    }

    /// Check if there are no pending operations
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Status of a transaction in its lifecycle
///
/// - `Active` → `Validating` → `Committed`
/// - `Validating` → `Aborted` (conflict)
/// - `Active` → `Aborted` (caller abort or error)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Executing, can read and write
    Active,
    /// Being validated for conflicts
    Validating,
    /// Committed successfully
    Committed,
    /// Aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// A compare-and-swap operation validated at commit
///
/// `expected_version = 0` means "the key must not exist". CAS does not add
/// the key to the read set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CASOperation {
    /// Key to swap
    pub key: Key,
    /// Version the key must be at when the transaction commits
    pub expected_version: u64,
    /// Value written if the check passes
    pub new_value: Value,
}

/// One optimistic unit of work
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,
    /// Snapshot version all reads observe
    pub start_version: u64,
    snapshot: Option<Box<dyn SnapshotView>>,
    /// Keys read from the snapshot and the version seen (0 = absent)
    pub read_set: HashMap<Key, u64>,
    /// Buffered writes
    pub write_set: HashMap<Key, Value>,
    /// Buffered deletes
    pub delete_set: HashSet<Key>,
    /// Buffered compare-and-swap operations
    pub cas_set: Vec<CASOperation>,
    /// Current lifecycle state
    pub status: TransactionStatus,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version)
            .field("reads", &self.read_set.len())
            .field("pending", &self.pending_operations())
            .field("status", &self.status)
            .finish()
    }
}

impl TransactionContext {
    /// Create a context without a snapshot
    ///
    /// Reads fail on such a context; it can only buffer blind writes.
    pub fn new(txn_id: u64, start_version: u64) -> Self {
        TransactionContext {
            txn_id,
            start_version,
            snapshot: None,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            delete_set: HashSet::new(),
            cas_set: Vec::new(),
            status: TransactionStatus::Active,
        }
    }

    /// Create a context reading through `snapshot`
    pub fn with_snapshot(txn_id: u64, snapshot: Box<dyn SnapshotView>) -> Self {
        let mut txn = Self::new(txn_id, snapshot.version());
        txn.snapshot = Some(snapshot);
        txn
    }

    // === Read Operations ===

    /// Read a key with read-your-writes semantics
    pub fn get(&mut self, key: &Key) -> LibraryResult<Option<Value>> {
        self.ensure_active()?;

        if let Some(value) = self.write_set.get(key) {
            return Ok(Some(value.clone()));
        }
        if self.delete_set.contains(key) {
            return Ok(None);
        }
        self.read_from_snapshot(key)
    }

    fn snapshot(&self) -> LibraryResult<&dyn SnapshotView> {
        self.snapshot.as_deref().ok_or_else(|| {
            LibraryError::internal(format!("transaction {} has no snapshot for reads", self.txn_id))
        })
    }

    fn read_from_snapshot(&mut self, key: &Key) -> LibraryResult<Option<Value>> {
        let entry = self.snapshot()?.get_entry(key)?;
        match entry {
            Some(entry) => {
                // Tombstones are tracked at their version so a re-create
                // after our read still conflicts.
                self.read_set.insert(key.clone(), entry.version.as_u64());
                Ok(entry.value)
            }
            None => {
                self.read_set.insert(key.clone(), 0);
                Ok(None)
            }
        }
    }

    /// Every visible key under `prefix`, sorted, with read-your-writes
    ///
    /// Keys returned from the snapshot enter the read set. Keys inserted by
    /// other transactions after the snapshot are not detected; callers that
    /// need phantom protection read a guard key alongside the scan.
    pub fn scan_prefix(&mut self, prefix: &Key) -> LibraryResult<Vec<(Key, Value)>> {
        self.ensure_active()?;

        let snapshot_results = self.snapshot()?.scan_prefix(prefix)?;
        let mut results: BTreeMap<Key, Value> = BTreeMap::new();

        for (key, vv) in snapshot_results {
            if !self.delete_set.contains(&key) {
                self.read_set.insert(key.clone(), vv.version.as_u64());
                results.insert(key, vv.value);
            }
        }
        for (key, value) in &self.write_set {
            if key.starts_with(prefix) {
                results.insert(key.clone(), value.clone());
            }
        }

        Ok(results.into_iter().collect())
    }

    /// Version recorded for a key read from the snapshot
    pub fn get_read_version(&self, key: &Key) -> Option<u64> {
        self.read_set.get(key).copied()
    }

    // === Write Operations ===

    /// Buffer a write
    pub fn put(&mut self, key: Key, value: Value) -> LibraryResult<()> {
        self.ensure_active()?;
        self.delete_set.remove(&key);
        self.write_set.insert(key, value);
        Ok(())
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: Key) -> LibraryResult<()> {
        self.ensure_active()?;
        self.write_set.remove(&key);
        self.delete_set.insert(key);
        Ok(())
    }

    /// Buffer a compare-and-swap, validated at commit
    ///
    /// Supersedes a delete of the same key buffered earlier in this
    /// transaction.
    pub fn cas(&mut self, key: Key, expected_version: u64, new_value: Value) -> LibraryResult<()> {
        self.ensure_active()?;
        self.delete_set.remove(&key);
        self.cas_set.push(CASOperation {
            key,
            expected_version,
            new_value,
        });
        Ok(())
    }

    // === State Management ===

    /// True while the transaction accepts operations
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// True once committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// True once aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Active or Validating transactions can still be rolled back
    pub fn can_rollback(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        )
    }

    /// Fail with `TransactionNotActive` unless Active
    pub fn ensure_active(&self) -> LibraryResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LibraryError::TransactionNotActive {
                state: format!("transaction {} is {:?}", self.txn_id, self.status),
            })
        }
    }

    /// Abort and discard buffered operations
    ///
    /// The read set is kept for diagnostics.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> LibraryResult<()> {
        if !self.can_rollback() {
            return Err(LibraryError::TransactionNotActive {
                state: format!(
                    "cannot abort transaction {} from {:?}",
                    self.txn_id, self.status
                ),
            });
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        self.write_set.clear();
        self.delete_set.clear();
        self.cas_set.clear();
        Ok(())
    }

    /// Buffered operation counts
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            puts: self.write_set.len(),
            deletes: self.delete_set.len(),
            cas: self.cas_set.len(),
        }
    }

    // === Commit ===

    /// Validate against current storage and move to Committed or Aborted
    ///
    /// Does not apply writes. The caller must hold whatever lock serializes
    /// commits between this call and [`apply_writes`](Self::apply_writes).
    pub fn commit<S: Storage + ?Sized>(&mut self, store: &S) -> Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!(
                "cannot commit transaction {} from {:?}",
                self.txn_id, self.status
            )));
        }
        self.status = TransactionStatus::Validating;

        let validation = match validate_transaction(self, store) {
            Ok(v) => v,
            Err(e) => {
                self.status = TransactionStatus::Aborted {
                    reason: e.to_string(),
                };
                return Err(CommitError::Storage(e.to_string()));
            }
        };

        if !validation.is_valid() {
            self.status = TransactionStatus::Aborted {
                reason: validation.summary(),
            };
            return Err(CommitError::ValidationFailed(validation));
        }

        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Apply buffered writes to storage at `commit_version`
    ///
    /// A CAS on a key also present in the write set wins over the put.
    pub fn apply_writes<S: Storage + ?Sized>(
        &self,
        store: &S,
        commit_version: u64,
    ) -> LibraryResult<ApplyResult> {
        if !self.is_committed() {
            return Err(LibraryError::TransactionNotActive {
                state: format!(
                    "cannot apply transaction {}: {:?}",
                    self.txn_id, self.status
                ),
            });
        }

        let mut writes: HashMap<Key, Value> = self.write_set.clone();
        for op in &self.cas_set {
            writes.insert(op.key.clone(), op.new_value.clone());
        }
        let result = ApplyResult {
            commit_version,
            puts_applied: self.write_set.len(),
            deletes_applied: self.delete_set.len(),
            cas_applied: self.cas_set.len(),
        };

        let deletes = self
            .delete_set
            .iter()
            .filter(|key| !writes.contains_key(*key))
            .cloned()
            .collect();
        store.apply_batch(writes.into_iter().collect(), deletes, commit_version)?;
        Ok(result)
    }

    // === Introspection ===

    /// Keys in the read set
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Keys in the write set
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Keys in the delete set
    pub fn delete_count(&self) -> usize {
        self.delete_set.len()
    }

    /// Buffered CAS operations
    pub fn cas_count(&self) -> usize {
        self.cas_set.len()
    }

    /// No buffered writes, deletes or CAS operations
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty() && self.delete_set.is_empty() && self.cas_set.is_empty()
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }
}
