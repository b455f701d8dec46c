//! Database engine for Folio
//!
//! Orchestrates the lower layers:
//! - Database: storage, configuration, clock and id allocation
//! - Transaction coordination: closure API with conflict retry, metrics
//!
//! Domain services in `folio-library` hold an `Arc<Database>` and run every
//! mutation through [`Database::transaction_with_retry`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod coordinator;
pub mod database;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use database::{
    Database, DatabaseBuilder, LibraryConfig, RetryConfig, CONFIG_FILE_NAME,
    MAX_PASSWORD_HASH_COST, MIN_PASSWORD_HASH_COST,
};
pub use folio_concurrency::TransactionContext;
