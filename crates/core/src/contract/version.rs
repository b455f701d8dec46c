//! Commit version identifier
//!
//! A single monotonic counter for the whole database, incremented once per
//! committed transaction. Every key written by a commit carries that commit's
//! version. Version 0 is reserved for "never written".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version assigned by a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version of a key that has never been written
    pub const ZERO: Version = Version(0);

    /// Wrap a raw commit version
    pub const fn new(raw: u64) -> Self {
        Version(raw)
    }

    /// Raw commit version
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// True for the reserved "never written" version
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Version(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_version() {
        assert!(Version::ZERO.is_zero());
        assert!(!Version::new(1).is_zero());
    }

    #[test]
    fn test_versions_are_ordered() {
        assert!(Version::new(1) < Version::new(2));
        assert_eq!(Version::from(7).as_u64(), 7);
    }

    #[test]
    fn test_display() {
        assert_eq!(Version::new(12).to_string(), "v12");
    }
}
