//! Storage-layer entry wrapper
//!
//! The contract type `VersionedEntry` already carries the tombstone as
//! `None`. `StoredValue` wraps it so chain code can talk in raw `u64`
//! versions without reaching through the contract type each time.

use chrono::{DateTime, Utc};
use folio_core::{Value, Version, Versioned, VersionedEntry, VersionedValue};

/// One version of one key: a live value or a tombstone
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    inner: VersionedEntry,
}

impl StoredValue {
    /// Live value written at `version`
    pub fn live(value: Value, version: u64, timestamp: DateTime<Utc>) -> Self {
        StoredValue {
            inner: Versioned::with_timestamp(Some(value), Version::new(version), timestamp),
        }
    }

    /// Delete marker written at `version`
    pub fn tombstone(version: u64, timestamp: DateTime<Utc>) -> Self {
        StoredValue {
            inner: Versioned::with_timestamp(None, Version::new(version), timestamp),
        }
    }

    /// Commit version as a raw integer
    #[inline]
    pub fn version(&self) -> u64 {
        self.inner.version.as_u64()
    }

    /// True for delete markers
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.inner.is_tombstone()
    }

    /// Borrow the contract entry
    #[inline]
    pub fn entry(&self) -> &VersionedEntry {
        &self.inner
    }

    /// Clone out as a live value, `None` for tombstones
    pub fn to_live(&self) -> Option<VersionedValue> {
        self.inner.clone().into_live()
    }
}
