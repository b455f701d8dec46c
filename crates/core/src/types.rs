//! Identifier and key types
//!
//! Every record lives under a [`Key`]: a [`TypeTag`] naming the record family
//! followed by an opaque `user_key`. Entity keys encode their id as 8
//! big-endian bytes so byte order matches numeric order. Index keys encode
//! the indexed value (ISBN, username, ...) or a pair of ids, which makes
//! "all loans of book B" a prefix scan.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw numeric id
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Author primary key
    AuthorId
);
entity_id!(
    /// Book primary key
    BookId
);
entity_id!(
    /// Patron (student profile) primary key
    PatronId
);
entity_id!(
    /// Identity account primary key
    AccountId
);
entity_id!(
    /// Loan primary key
    LoanId
);

/// Record family discriminator
///
/// Entity tags hold the records themselves; index tags hold
/// [`Value::Ref`](crate::Value::Ref) rows pointing at an entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeTag {
    /// Author records
    Author = 0x01,
    /// Book records
    Book = 0x02,
    /// Patron records
    Patron = 0x03,
    /// Identity account records
    Account = 0x04,
    /// Loan records
    Loan = 0x05,
    /// ISBN -> book id
    IsbnIndex = 0x10,
    /// student id -> patron id
    StudentIdIndex = 0x11,
    /// username -> account id
    UsernameIndex = 0x12,
    /// account id -> patron id
    AccountPatronIndex = 0x13,
    /// (patron, book) -> loan id, present only while the loan is Borrowed
    ActiveLoanIndex = 0x14,
    /// (book, loan) -> loan id, one row per loan ever made of the book
    BookLoanIndex = 0x15,
    /// (patron, loan) -> loan id, one row per loan made by the patron
    PatronLoanIndex = 0x16,
}

impl TypeTag {
    /// Convert to byte representation
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Try to create from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(TypeTag::Author),
            0x02 => Some(TypeTag::Book),
            0x03 => Some(TypeTag::Patron),
            0x04 => Some(TypeTag::Account),
            0x05 => Some(TypeTag::Loan),
            0x10 => Some(TypeTag::IsbnIndex),
            0x11 => Some(TypeTag::StudentIdIndex),
            0x12 => Some(TypeTag::UsernameIndex),
            0x13 => Some(TypeTag::AccountPatronIndex),
            0x14 => Some(TypeTag::ActiveLoanIndex),
            0x15 => Some(TypeTag::BookLoanIndex),
            0x16 => Some(TypeTag::PatronLoanIndex),
            _ => None,
        }
    }

    /// True for tags that hold index rows rather than entities
    pub fn is_index(&self) -> bool {
        self.as_byte() >= 0x10
    }

    /// Short lowercase name, used in log fields
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Author => "author",
            TypeTag::Book => "book",
            TypeTag::Patron => "patron",
            TypeTag::Account => "account",
            TypeTag::Loan => "loan",
            TypeTag::IsbnIndex => "isbn_index",
            TypeTag::StudentIdIndex => "student_id_index",
            TypeTag::UsernameIndex => "username_index",
            TypeTag::AccountPatronIndex => "account_patron_index",
            TypeTag::ActiveLoanIndex => "active_loan_index",
            TypeTag::BookLoanIndex => "book_loan_index",
            TypeTag::PatronLoanIndex => "patron_loan_index",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Composite storage key
///
/// Ordering is by type tag first, then by `user_key` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    /// Record family
    pub type_tag: TypeTag,
    /// Family-specific key bytes
    pub user_key: Vec<u8>,
}

impl Key {
    /// Create a key from raw parts
    pub fn new(type_tag: TypeTag, user_key: Vec<u8>) -> Self {
        Key { type_tag, user_key }
    }

    /// Prefix matching every key of a family
    pub fn prefix(type_tag: TypeTag) -> Self {
        Key::new(type_tag, Vec::new())
    }

    fn for_id(type_tag: TypeTag, id: u64) -> Self {
        Key::new(type_tag, id.to_be_bytes().to_vec())
    }

    fn for_pair(type_tag: TypeTag, first: u64, second: u64) -> Self {
        let mut user_key = Vec::with_capacity(16);
        user_key.extend_from_slice(&first.to_be_bytes());
        user_key.extend_from_slice(&second.to_be_bytes());
        Key::new(type_tag, user_key)
    }

    /// Author record key
    pub fn author(id: AuthorId) -> Self {
        Key::for_id(TypeTag::Author, id.as_u64())
    }

    /// Book record key
    pub fn book(id: BookId) -> Self {
        Key::for_id(TypeTag::Book, id.as_u64())
    }

    /// Patron record key
    pub fn patron(id: PatronId) -> Self {
        Key::for_id(TypeTag::Patron, id.as_u64())
    }

    /// Account record key
    pub fn account(id: AccountId) -> Self {
        Key::for_id(TypeTag::Account, id.as_u64())
    }

    /// Loan record key
    pub fn loan(id: LoanId) -> Self {
        Key::for_id(TypeTag::Loan, id.as_u64())
    }

    /// ISBN uniqueness index row
    pub fn isbn(isbn: &str) -> Self {
        Key::new(TypeTag::IsbnIndex, isbn.as_bytes().to_vec())
    }

    /// Student id uniqueness index row
    pub fn student_id(student_id: &str) -> Self {
        Key::new(TypeTag::StudentIdIndex, student_id.as_bytes().to_vec())
    }

    /// Username uniqueness index row
    pub fn username(username: &str) -> Self {
        Key::new(TypeTag::UsernameIndex, username.as_bytes().to_vec())
    }

    /// Account -> patron link row
    pub fn account_patron(account_id: AccountId) -> Self {
        Key::for_id(TypeTag::AccountPatronIndex, account_id.as_u64())
    }

    /// Active-borrow guard row for (patron, book)
    pub fn active_loan(patron_id: PatronId, book_id: BookId) -> Self {
        Key::for_pair(
            TypeTag::ActiveLoanIndex,
            patron_id.as_u64(),
            book_id.as_u64(),
        )
    }

    /// Reference row tying a loan to its book
    pub fn book_loan(book_id: BookId, loan_id: LoanId) -> Self {
        Key::for_pair(TypeTag::BookLoanIndex, book_id.as_u64(), loan_id.as_u64())
    }

    /// Prefix of every loan reference row for a book
    pub fn book_loans(book_id: BookId) -> Self {
        Key::for_id(TypeTag::BookLoanIndex, book_id.as_u64())
    }

    /// Reference row tying a loan to its patron
    pub fn patron_loan(patron_id: PatronId, loan_id: LoanId) -> Self {
        Key::for_pair(
            TypeTag::PatronLoanIndex,
            patron_id.as_u64(),
            loan_id.as_u64(),
        )
    }

    /// Prefix of every loan reference row for a patron
    pub fn patron_loans(patron_id: PatronId) -> Self {
        Key::for_id(TypeTag::PatronLoanIndex, patron_id.as_u64())
    }

    /// Check whether this key falls under `prefix`
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.type_tag == prefix.type_tag && self.user_key.starts_with(&prefix.user_key)
    }

    /// Trailing id of an id-encoded key, if it has one
    pub fn trailing_id(&self) -> Option<u64> {
        let len = self.user_key.len();
        if len < 8 || len % 8 != 0 {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.user_key[len - 8..]);
        Some(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_tag {
            TypeTag::IsbnIndex | TypeTag::StudentIdIndex | TypeTag::UsernameIndex => write!(
                f,
                "{}:{}",
                self.type_tag,
                String::from_utf8_lossy(&self.user_key)
            ),
            _ => {
                write!(f, "{}", self.type_tag)?;
                for chunk in self.user_key.chunks(8) {
                    let mut bytes = [0u8; 8];
                    bytes[8 - chunk.len()..].copy_from_slice(chunk);
                    write!(f, ":{}", u64::from_be_bytes(bytes))?;
                }
                Ok(())
            }
        }
    }
}
