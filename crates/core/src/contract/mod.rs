//! Contract types for versioned reads
//!
//! Every read from storage returns data wrapped in [`Versioned`], and every
//! commit produces a single [`Version`] shared by all of its writes. The
//! concurrency layer compares these versions at commit time to detect
//! concurrent modification.
//!
//! - `version`: commit version identifier
//! - `versioned`: value + version + commit timestamp

pub mod version;
pub mod versioned;

pub use version::Version;
pub use versioned::{Versioned, VersionedEntry, VersionedValue};
