//! Generic versioned wrapper type
//!
//! Reads return `Versioned<T>` (value + version + commit timestamp). The
//! storage layer also exposes `VersionedEntry`, whose value is `None` for a
//! tombstone; the concurrency layer needs tombstone versions so that a read
//! of a deleted key can still be validated at commit time.

use super::Version;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value with its version information
///
/// ## Invariants
///
/// - `version` is the commit that produced this value
/// - `timestamp` is the wall-clock time of that commit
/// - Values are never modified after creation (immutable versions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The actual value
    pub value: T,

    /// Commit version
    pub version: Version,

    /// Commit timestamp
    pub timestamp: DateTime<Utc>,
}

/// Stored value with version metadata
pub type VersionedValue = Versioned<Value>;

/// Stored value or tombstone with version metadata
pub type VersionedEntry = Versioned<Option<Value>>;

impl<T> Versioned<T> {
    /// Create a versioned value stamped with the current time
    pub fn new(value: T, version: Version) -> Self {
        Versioned {
            value,
            version,
            timestamp: Utc::now(),
        }
    }

    /// Create a versioned value with explicit timestamp
    pub fn with_timestamp(value: T, version: Version, timestamp: DateTime<Utc>) -> Self {
        Versioned {
            value,
            version,
            timestamp,
        }
    }

    /// Map the inner value to a new type
    pub fn map<U, F>(self, f: F) -> Versioned<U>
    where
        F: FnOnce(T) -> U,
    {
        Versioned {
            value: f(self.value),
            version: self.version,
            timestamp: self.timestamp,
        }
    }

    /// Consume and return the inner value
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }
}

impl VersionedEntry {
    /// True when this entry records a delete
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Drop the tombstone wrapper, returning `None` for deletes
    pub fn into_live(self) -> Option<VersionedValue> {
        let Versioned {
            value,
            version,
            timestamp,
        } = self;
        value.map(|value| Versioned {
            value,
            version,
            timestamp,
        })
    }
}
