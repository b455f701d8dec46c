//! Core types and traits for Folio
//!
//! This crate defines the foundational types used throughout the system:
//! - Entity ids: AuthorId, BookId, PatronId, AccountId, LoanId
//! - Key / TypeTag: composite storage keys, one tag per record family
//! - Value: the record stored under a key (entities and index references)
//! - Model: Author, Book, Patron, Account, Loan
//! - Error: the `LibraryError` taxonomy
//! - Traits: Storage and SnapshotView, implemented by the storage layer
//! - Contract types: Version, Versioned<T>

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod limits;
pub mod model;
pub mod traits;
pub mod types;
pub mod value;

pub use contract::{Version, Versioned, VersionedEntry, VersionedValue};
pub use error::{LibraryError, LibraryResult};
pub use model::{Account, Author, Book, Loan, LoanStatus, Patron};
pub use traits::{SnapshotView, Storage};
pub use types::{AccountId, AuthorId, BookId, Key, LoanId, PatronId, TypeTag};
pub use value::{Record, Value};
