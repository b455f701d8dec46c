//! Database struct and transaction API
//!
//! The Database owns the store, the transaction coordinator, configuration,
//! the clock and the id sequences. It offers two ways to run a unit of work:
//!
//! 1. **Closure API** (recommended): `db.transaction_with_retry(|txn| { ... })`
//!    - Commits on `Ok`, aborts on `Err`
//!    - Re-runs the closure on commit-time conflict
//!
//! 2. **Manual API**: `begin_transaction()` + `commit_transaction()`
//!    - For callers composing several operations before deciding to commit
//!    - A manual transaction pins old versions until it is committed or
//!      aborted
//!
//! Every commit trims the version chains of the keys it wrote down to what
//! the oldest unfinished transaction can still read, so rewriting a key
//! does not grow its chain without bound.

mod builder;
pub mod config;
mod transactions;

pub use builder::DatabaseBuilder;
pub use config::{
    LibraryConfig, CONFIG_FILE_NAME, MAX_PASSWORD_HASH_COST, MIN_PASSWORD_HASH_COST,
};
pub use transactions::RetryConfig;

use crate::clock::{Clock, SystemClock};
use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use folio_concurrency::TransactionContext;
use folio_core::{LibraryError, LibraryResult, Storage, TypeTag};
use folio_storage::ShardedStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared handle to the library's storage and transaction machinery
///
/// Records are held in memory; the data directory, when there is one, holds
/// `folio.toml`.
pub struct Database {
    data_dir: Option<PathBuf>,
    storage: Arc<ShardedStore>,
    coordinator: TransactionCoordinator,
    config: LibraryConfig,
    clock: Arc<dyn Clock>,
    /// Next id per entity family. Ids are handed out outside the unit of
    /// work, so an aborted attempt leaves a gap.
    sequences: DashMap<TypeTag, AtomicU64>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("storage", &self.storage)
            .field("config", &self.config)
            .finish()
    }
}

impl Database {
    pub(crate) fn from_parts(
        config: LibraryConfig,
        clock: Arc<dyn Clock>,
        data_dir: Option<PathBuf>,
    ) -> Self {
        let storage = Arc::new(ShardedStore::new());
        let coordinator = TransactionCoordinator::new(storage.current_version());
        Database {
            data_dir,
            storage,
            coordinator,
            config,
            clock,
            sequences: DashMap::new(),
        }
    }

    /// Start a builder
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// In-memory database with default configuration and the system clock
    pub fn ephemeral() -> Arc<Self> {
        Arc::new(Self::from_parts(
            LibraryConfig::default(),
            Arc::new(SystemClock),
            None,
        ))
    }

    /// In-memory database with explicit configuration
    pub fn with_config(config: LibraryConfig) -> LibraryResult<Arc<Self>> {
        Self::builder().config(config).build()
    }

    /// Open a data directory, reading `folio.toml` from it
    ///
    /// Creates the directory and a default `folio.toml` when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> LibraryResult<Arc<Self>> {
        let dir = path.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            LibraryError::storage(format!(
                "failed to create data directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        LibraryConfig::write_default_if_missing(&config_path)?;
        let config = LibraryConfig::from_file(&config_path)?;

        info!(
            target: "folio::engine",
            path = %dir.display(),
            borrow_period_days = config.borrow_period_days,
            "Opened library database"
        );

        Self::builder().config(config).path(dir).build()
    }

    /// Data directory, if opened from one
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Active configuration
    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Retry policy from the configuration
    pub fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    /// Configured borrow period
    pub fn borrow_period(&self) -> Duration {
        self.config.borrow_period()
    }

    /// Current time according to the database clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Underlying store
    pub fn storage(&self) -> &Arc<ShardedStore> {
        &self.storage
    }

    /// Latest commit version
    pub fn current_version(&self) -> u64 {
        self.coordinator.current_version()
    }

    /// Transaction counters
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    /// Allocate the next id for an entity family, starting at 1
    pub fn next_id(&self, tag: TypeTag) -> u64 {
        self.sequences
            .entry(tag)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    // ========================================================================
    // Transaction API
    // ========================================================================

    /// Begin a transaction for manual control
    pub fn begin_transaction(&self) -> TransactionContext {
        self.coordinator.start_transaction(&self.storage)
    }

    /// Commit a manually managed transaction, returning its commit version
    ///
    /// A conflict is returned as `LibraryError::Conflict`; the transaction is
    /// left Aborted.
    pub fn commit_transaction(&self, txn: &mut TransactionContext) -> LibraryResult<u64> {
        let version = self.coordinator.commit(txn, self.storage.as_ref())?;
        if !txn.is_read_only() {
            let horizon = self.coordinator.gc_horizon(&self.storage);
            let written = txn
                .write_set
                .keys()
                .chain(txn.delete_set.iter())
                .chain(txn.cas_set.iter().map(|op| &op.key));
            let pruned = self.storage.gc_keys(written, horizon);
            if pruned > 0 {
                debug!(
                    target: "folio::storage",
                    version,
                    horizon,
                    pruned,
                    "Trimmed rewritten keys"
                );
            }
        }
        Ok(version)
    }

    /// Abort a manually managed transaction
    pub fn abort_transaction(&self, txn: &mut TransactionContext, reason: impl Into<String>) {
        if txn.mark_aborted(reason).is_ok() {
            self.coordinator.record_abort(txn.start_version);
        }
    }

    /// Oldest version an unfinished transaction may still read
    pub fn gc_horizon(&self) -> u64 {
        self.coordinator.gc_horizon(&self.storage)
    }

    /// Garbage-collect old versions before the given version number
    ///
    /// The bound is clamped to [`gc_horizon`](Self::gc_horizon), so versions
    /// a live transaction can read are never removed. Returns the number of
    /// pruned versions.
    pub fn gc_versions_before(&self, min_version: u64) -> usize {
        let bound = min_version.min(self.gc_horizon());
        self.storage.gc_versions_before(bound)
    }

    fn run_single_attempt<T>(
        &self,
        txn: &mut TransactionContext,
        result: LibraryResult<T>,
    ) -> LibraryResult<T> {
        match result {
            Ok(value) => {
                self.commit_transaction(txn)?;
                Ok(value)
            }
            Err(e) => {
                self.abort_transaction(txn, format!("closure error: {e}"));
                Err(e)
            }
        }
    }

    /// Run `f` in one unit of work, committing on `Ok`
    ///
    /// No retry: a commit-time conflict is returned as `Conflict`.
    pub fn transaction<F, T>(&self, f: F) -> LibraryResult<T>
    where
        F: FnOnce(&mut TransactionContext) -> LibraryResult<T>,
    {
        let mut txn = self.begin_transaction();
        let result = f(&mut txn);
        self.run_single_attempt(&mut txn, result)
    }

    /// Run `f` with the configured retry policy
    pub fn transaction_with_retry<F, T>(&self, f: F) -> LibraryResult<T>
    where
        F: Fn(&mut TransactionContext) -> LibraryResult<T>,
    {
        self.transaction_with_retry_config(&self.config.retry, f)
    }

    /// Run `f`, re-running it on conflict per `config`
    ///
    /// Each attempt gets a fresh snapshot, so the retried closure observes
    /// the winner's writes. Errors other than `Conflict` are returned
    /// immediately.
    pub fn transaction_with_retry_config<F, T>(
        &self,
        config: &RetryConfig,
        f: F,
    ) -> LibraryResult<T>
    where
        F: Fn(&mut TransactionContext) -> LibraryResult<T>,
    {
        let mut attempt = 0;
        loop {
            let mut txn = self.begin_transaction();
            let result = f(&mut txn);
            match self.run_single_attempt(&mut txn, result) {
                Err(e) if e.is_conflict() && attempt < config.max_retries => {
                    self.coordinator.record_retry();
                    std::thread::sleep(config.calculate_delay(attempt));
                    attempt += 1;
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        target: "folio::txn",
                        attempts = attempt + 1,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    return Err(e);
                }
                outcome => return outcome,
            }
        }
    }
}
