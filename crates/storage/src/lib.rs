//! Storage layer for Folio
//!
//! In-memory MVCC store:
//! - ShardedStore: DashMap keyed by type tag, FxHashMap within each shard
//! - Version chains per key, tombstones for deletes
//! - ShardedSnapshot: O(1) point-in-time views filtered by version

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sharded;
pub mod stored_value;

pub use sharded::{Shard, ShardedSnapshot, ShardedStore, VersionChain};
pub use stored_value::StoredValue;
