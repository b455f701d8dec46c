//! Concurrency layer for Folio
//!
//! Optimistic concurrency control:
//! - TransactionContext: read/write/delete/CAS set tracking over a snapshot
//! - Conflict detection at commit time (first committer wins)
//! - TransactionManager: serialized validate-and-apply under one version

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{
    ApplyResult, CASOperation, CommitError, PendingOperations, TransactionContext,
    TransactionStatus,
};
pub use validation::{ConflictType, ValidationResult};
