//! Stored values
//!
//! A [`Value`] is whatever lives under a [`Key`]: one of the entity records,
//! or `Ref(id)` for an index row. The [`Record`] trait gives services a typed
//! view over the untyped store so they never match on `Value` by hand.

use crate::error::{LibraryError, LibraryResult};
use crate::model::{Account, Author, Book, Loan, Patron};
use crate::types::{AccountId, AuthorId, BookId, Key, LoanId, PatronId, TypeTag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value stored under a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Author record
    Author(Author),
    /// Book record
    Book(Book),
    /// Patron record
    Patron(Patron),
    /// Identity account record
    Account(Account),
    /// Loan record
    Loan(Loan),
    /// Index row pointing at an entity id
    Ref(u64),
}

impl Value {
    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Author(_) => "author",
            Value::Book(_) => "book",
            Value::Patron(_) => "patron",
            Value::Account(_) => "account",
            Value::Loan(_) => "loan",
            Value::Ref(_) => "ref",
        }
    }

    /// Target id if this is an index row
    pub fn as_ref_id(&self) -> Option<u64> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

/// An entity that can be stored as a [`Value`]
pub trait Record: Sized + Clone {
    /// Tag of the family this record is stored under
    const TYPE_TAG: TypeTag;
    /// Entity name for `NotFound` errors
    const ENTITY: &'static str;
    /// Primary key type
    type Id: Copy + fmt::Display + Into<u64>;

    /// Primary key of this record
    fn id(&self) -> Self::Id;

    /// Storage key for an id
    fn key_for(id: Self::Id) -> Key;

    /// Storage key of this record
    fn key(&self) -> Key {
        Self::key_for(self.id())
    }

    /// Wrap into a storable value
    fn into_value(self) -> Value;

    /// Unwrap from a stored value
    ///
    /// A value of the wrong variant means the keyspace is corrupt and is
    /// reported as `Internal`.
    fn from_value(value: Value) -> LibraryResult<Self>;
}

macro_rules! impl_record {
    ($ty:ident, $id:ident, $tag:ident, $entity:literal, $key_fn:ident) => {
        impl Record for $ty {
            const TYPE_TAG: TypeTag = TypeTag::$tag;
            const ENTITY: &'static str = $entity;
            type Id = $id;

            fn id(&self) -> $id {
                self.id
            }

            fn key_for(id: $id) -> Key {
                Key::$key_fn(id)
            }

            fn into_value(self) -> Value {
                Value::$ty(self)
            }

            fn from_value(value: Value) -> LibraryResult<Self> {
                match value {
                    Value::$ty(record) => Ok(record),
                    other => Err(LibraryError::internal(format!(
                        "expected {} record, found {}",
                        $entity,
                        other.kind()
                    ))),
                }
            }
        }
    };
}

impl_record!(Author, AuthorId, Author, "author", author);
impl_record!(Book, BookId, Book, "book", book);
impl_record!(Patron, PatronId, Patron, "patron", patron);
impl_record!(Account, AccountId, Account, "account", account);
impl_record!(Loan, LoanId, Loan, "loan", loan);
