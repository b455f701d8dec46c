//! Transaction manager for coordinating commits
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. acquire commit lock
//! 2. txn.commit()        Active -> Validating -> Committed | Aborted
//! 3. IF conflicts: release lock, return ValidationFailed
//! 4. allocate commit_version
//! 5. apply_writes()      one batch, one version
//! 6. release lock, return commit_version
//! ```
//!
//! Steps 2-5 run under one lock, so no other commit can change a version
//! between validation and application. Snapshots and reads never take it.

use crate::{CommitError, TransactionContext};
use folio_core::{LibraryResult, Storage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Allocates transaction ids and commit versions and serializes commits
#[derive(Debug)]
pub struct TransactionManager {
    version: AtomicU64,
    next_txn_id: AtomicU64,
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Start allocating versions after `initial_version`
    ///
    /// Pass the store's current version so commit versions keep increasing.
    pub fn new(initial_version: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Most recently allocated commit version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate a transaction id
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    fn allocate_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Validate and apply a transaction atomically
    ///
    /// Returns the commit version. Read-only transactions commit without
    /// allocating a version and return the current one.
    pub fn commit<S: Storage + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> Result<u64, CommitError> {
        let _guard = self.commit_lock.lock();

        txn.commit(store)?;

        if txn.is_read_only() {
            return Ok(self.current_version());
        }

        let commit_version = self.allocate_version();
        match txn.apply_writes(store, commit_version) {
            Ok(applied) => {
                debug!(
                    target: "folio::txn",
                    txn_id = txn.txn_id,
                    commit_version,
                    operations = applied.total_operations(),
                    "Applied transaction"
                );
                Ok(commit_version)
            }
            Err(e) => {
                error!(
                    target: "folio::txn",
                    txn_id = txn.txn_id,
                    commit_version,
                    error = %e,
                    "Storage rejected committed batch"
                );
                Err(CommitError::Storage(e.to_string()))
            }
        }
    }

    /// Abort a transaction, discarding its buffered operations
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) -> LibraryResult<()> {
        txn.mark_aborted(reason)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(0)
    }
}
