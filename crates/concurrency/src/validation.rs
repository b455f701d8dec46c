//! Transaction validation for OCC
//!
//! Rules:
//! - First committer wins, judged on the READ set: a key read at version V
//!   conflicts if its current version is no longer V
//! - Blind writes (written without being read) never conflict
//! - CAS operations are checked against their expected version, independent
//!   of the read set
//! - Read-only transactions always commit
//!
//! Validation must run under the manager's commit lock so the versions it
//! compares against cannot move before the writes are applied.

use crate::transaction::{CASOperation, TransactionContext};
use folio_core::{Key, LibraryResult, Storage};
use std::collections::HashMap;

/// A single detected conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A key in the read set changed after it was read
    ReadWriteConflict {
        /// Conflicting key
        key: Key,
        /// Version observed by the transaction (0 = absent)
        read_version: u64,
        /// Version in storage at commit time
        current_version: u64,
    },
    /// A CAS expected a version the key is no longer at
    CASConflict {
        /// Conflicting key
        key: Key,
        /// Version the CAS required
        expected_version: u64,
        /// Version in storage at commit time
        current_version: u64,
    },
}

impl ConflictType {
    /// Key the conflict was detected on
    pub fn key(&self) -> &Key {
        match self {
            ConflictType::ReadWriteConflict { key, .. } | ConflictType::CASConflict { key, .. } => {
                key
            }
        }
    }
}

/// Outcome of validating one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Every conflict found; empty means the commit may proceed
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A result with no conflicts
    pub fn ok() -> Self {
        Self::default()
    }

    /// True when no conflicts were found
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Absorb another result's conflicts
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// One-line description for logs and `LibraryError::Conflict`
    pub fn summary(&self) -> String {
        let mut keys: Vec<String> = self.conflicts.iter().map(|c| c.key().to_string()).collect();
        keys.sort();
        keys.dedup();
        format!(
            "{} conflict(s) on {}",
            self.conflict_count(),
            keys.join(", ")
        )
    }
}

/// Check every read-set entry against current storage versions
pub fn validate_read_set<S: Storage + ?Sized>(
    read_set: &HashMap<Key, u64>,
    store: &S,
) -> LibraryResult<ValidationResult> {
    let mut result = ValidationResult::ok();
    for (key, read_version) in read_set {
        let current_version = store.latest_version(key)?;
        if current_version != *read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }
    Ok(result)
}

/// Check every CAS against current storage versions
pub fn validate_cas_set<S: Storage + ?Sized>(
    cas_set: &[CASOperation],
    store: &S,
) -> LibraryResult<ValidationResult> {
    let mut result = ValidationResult::ok();
    for op in cas_set {
        let current_version = store.latest_version(&op.key)?;
        if current_version != op.expected_version {
            result.conflicts.push(ConflictType::CASConflict {
                key: op.key.clone(),
                expected_version: op.expected_version,
                current_version,
            });
        }
    }
    Ok(result)
}

/// Validate a whole transaction
pub fn validate_transaction<S: Storage + ?Sized>(
    txn: &TransactionContext,
    store: &S,
) -> LibraryResult<ValidationResult> {
    if txn.is_read_only() {
        return Ok(ValidationResult::ok());
    }

    let mut result = validate_read_set(&txn.read_set, store)?;
    result.merge(validate_cas_set(&txn.cas_set, store)?);
    Ok(result)
}
