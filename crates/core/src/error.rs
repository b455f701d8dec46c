//! Error types for Folio
//!
//! Every fallible operation in the workspace returns [`LibraryResult`].
//! Domain failures (missing records, stock exhaustion, ownership and
//! uniqueness violations) are recoverable and carry the offending field or
//! record. `Conflict` is the optimistic-concurrency abort raised at commit
//! time; the engine retries it and never hands it to callers unless the
//! retry budget runs out. `Storage` and `Internal` are unexpected failures.

use thiserror::Error;

/// Result type alias for Folio operations
pub type LibraryResult<T> = std::result::Result<T, LibraryError>;

/// Error taxonomy for the library engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    /// A referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Record family ("book", "patron", ...)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The book has no available copies
    #[error("'{title}' (book {book_id}) is currently out of stock")]
    OutOfStock {
        /// Book that was requested
        book_id: u64,
        /// Title, for the caller-facing message
        title: String,
    },

    /// The patron already holds an unreturned loan of this book
    #[error("patron {patron_id} has already borrowed book {book_id} and not returned it")]
    DuplicateActiveBorrow {
        /// Borrowing patron
        patron_id: u64,
        /// Book already on loan to the patron
        book_id: u64,
    },

    /// The loan was already returned
    #[error("loan {loan_id} was already returned")]
    AlreadyReturned {
        /// Loan that was returned twice
        loan_id: u64,
    },

    /// The loan belongs to a different patron
    #[error("loan {loan_id} does not belong to patron {patron_id}")]
    NotOwner {
        /// Loan being returned
        loan_id: u64,
        /// Patron attempting the return
        patron_id: u64,
    },

    /// The book cannot be deleted while loans reference it
    #[error("book {book_id} is referenced by {loans} loan record(s)")]
    ReferencedByTransaction {
        /// Book being deleted
        book_id: u64,
        /// Number of loans referencing the book
        loans: usize,
    },

    /// An account with this username already exists
    #[error("a user with username '{username}' already exists")]
    DuplicateIdentity {
        /// Conflicting username
        username: String,
    },

    /// A patron with this student id already exists
    #[error("a student with id '{student_id}' already exists")]
    DuplicatePatronId {
        /// Conflicting student id
        student_id: String,
    },

    /// A book with this ISBN already exists
    #[error("a book with ISBN '{isbn}' already exists")]
    DuplicateIsbn {
        /// Conflicting ISBN
        isbn: String,
    },

    /// A field failed validation
    #[error("invalid {field}: {reason}")]
    ValidationError {
        /// Field name as seen by the caller
        field: &'static str,
        /// Human-readable reason
        reason: String,
    },

    /// The patron profile is deactivated and cannot borrow
    #[error("patron {patron_id} is deactivated")]
    PatronInactive {
        /// Deactivated patron
        patron_id: u64,
    },

    /// The access policy denied the operation
    #[error("operation not permitted: {reason}")]
    Forbidden {
        /// Why the policy denied access
        reason: String,
    },

    /// Registration could not persist the account and profile
    #[error("registration failed: {reason}")]
    CreationFailed {
        /// Underlying failure
        reason: String,
    },

    /// Commit-time validation detected a concurrent modification
    #[error("transaction conflict: {reason}")]
    Conflict {
        /// Conflict summary
        reason: String,
    },

    /// Operation attempted on a transaction that is no longer active
    #[error("transaction not active: {state}")]
    TransactionNotActive {
        /// State the transaction was found in
        state: String,
    },

    /// Storage layer failure
    #[error("storage error: {message}")]
    Storage {
        /// Failure description
        message: String,
    },

    /// Invariant violation or other unexpected failure
    #[error("internal error: {message}")]
    Internal {
        /// Failure description
        message: String,
    },
}

impl LibraryError {
    /// Build a `NotFound` error
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        LibraryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Build a field-level `ValidationError`
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        LibraryError::ValidationError {
            field,
            reason: reason.into(),
        }
    }

    /// Build a retryable `Conflict`
    pub fn conflict(reason: impl Into<String>) -> Self {
        LibraryError::Conflict {
            reason: reason.into(),
        }
    }

    /// Build a `Storage` error
    pub fn storage(message: impl Into<String>) -> Self {
        LibraryError::Storage {
            message: message.into(),
        }
    }

    /// Build an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        LibraryError::Internal {
            message: message.into(),
        }
    }

    /// True for optimistic-concurrency aborts that may succeed on retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, LibraryError::Conflict { .. })
    }

    /// True for errors that describe a business-rule outcome rather than a
    /// malfunction
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            LibraryError::Conflict { .. }
                | LibraryError::TransactionNotActive { .. }
                | LibraryError::Storage { .. }
                | LibraryError::Internal { .. }
                | LibraryError::CreationFailed { .. }
        )
    }

    /// Suggested HTTP status for a REST adapter
    pub fn http_status(&self) -> u16 {
        match self {
            LibraryError::NotFound { .. } => 404,
            LibraryError::OutOfStock { .. }
            | LibraryError::DuplicateActiveBorrow { .. }
            | LibraryError::AlreadyReturned { .. }
            | LibraryError::NotOwner { .. }
            | LibraryError::DuplicateIdentity { .. }
            | LibraryError::DuplicatePatronId { .. }
            | LibraryError::DuplicateIsbn { .. }
            | LibraryError::ValidationError { .. }
            | LibraryError::PatronInactive { .. } => 400,
            LibraryError::Forbidden { .. } => 403,
            LibraryError::ReferencedByTransaction { .. } | LibraryError::Conflict { .. } => 409,
            LibraryError::CreationFailed { .. }
            | LibraryError::TransactionNotActive { .. }
            | LibraryError::Storage { .. }
            | LibraryError::Internal { .. } => 500,
        }
    }
}
