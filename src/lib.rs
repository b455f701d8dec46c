//! Folio - library circulation engine
//!
//! Folio keeps a book catalog, student patron profiles and a loan ledger
//! in one transactional in-memory store. Borrows and returns are atomic
//! and safe under concurrent use.
//!
//! # Quick Start
//!
//! ```ignore
//! use folio::{BookInput, Folio, NewAccount, PatronInput, RegistrationRequest};
//!
//! let folio = Folio::ephemeral();
//!
//! let book = folio.catalog().create_book(BookInput::new("Dune", "9780441013593", 2))?;
//! let patron = folio.registration().register(RegistrationRequest {
//!     account: NewAccount::new("ada", "ada@uni.edu", "s3cret"),
//!     patron: PatronInput::new("S-1042"),
//! })?;
//!
//! let loan = folio.ledger().borrow(patron.id, book.id)?;
//! folio.ledger().return_book(patron.id, loan.id)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! folio            this facade
//! folio-library    Catalog, Patrons, Registration, Ledger, AccessPolicy
//! folio-engine     Database: transactions with retry, config, clock
//! folio-concurrency  optimistic transactions, commit validation
//! folio-storage    sharded multi-version store
//! folio-core       ids, keys, records, errors
//! ```

use std::path::Path;
use std::sync::Arc;

pub use folio_core::{
    Account, AccountId, Author, AuthorId, Book, BookId, LibraryError, LibraryResult, Loan, LoanId,
    LoanStatus, Patron, PatronId,
};
pub use folio_engine::{
    Clock, Database, DatabaseBuilder, LibraryConfig, ManualClock, RetryConfig, SystemClock,
    TransactionMetrics, MAX_PASSWORD_HASH_COST, MIN_PASSWORD_HASH_COST,
};
pub use folio_library::{
    AccessPolicy, AccountStore, Action, Actor, AdminOrOwner, AuthorInput, BookInput,
    CascadeReport, Catalog, Decision, IdentityProvider, Ledger, LoanView, NewAccount,
    PatronInput, Patrons, Registration, RegistrationRequest, Resource,
};

/// Every library service over one database
///
/// Cheap to clone; all services share the same `Arc<Database>`.
#[derive(Clone)]
pub struct Folio {
    db: Arc<Database>,
    identity: Arc<AccountStore>,
    catalog: Catalog,
    patrons: Patrons,
    registration: Registration,
    ledger: Ledger,
}

impl Folio {
    /// In-memory library with default configuration
    pub fn ephemeral() -> Self {
        Self::from_database(Database::ephemeral())
    }

    /// Library configured from `folio.toml` in `dir`, created if missing
    pub fn open<P: AsRef<Path>>(dir: P) -> LibraryResult<Self> {
        Ok(Self::from_database(Database::open(dir)?))
    }

    /// Wire the services over an existing database
    pub fn from_database(db: Arc<Database>) -> Self {
        let identity = Arc::new(AccountStore::new(db.clone()));
        Folio {
            catalog: Catalog::new(db.clone()),
            patrons: Patrons::new(db.clone(), identity.clone()),
            registration: Registration::new(db.clone(), identity.clone()),
            ledger: Ledger::new(db.clone()),
            identity,
            db,
        }
    }

    /// Underlying database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Identity accounts
    pub fn accounts(&self) -> &AccountStore {
        &self.identity
    }

    /// Authors and books
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Patron profiles
    pub fn patrons(&self) -> &Patrons {
        &self.patrons
    }

    /// Self-service sign-up
    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Borrow/return
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}
