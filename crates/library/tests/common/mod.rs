//! Shared fixtures for the library integration suites.
//!
//! Import via `mod common;`.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Once};

use chrono::{TimeZone, Utc};
use folio_core::{Book, BookId, Patron};
use folio_engine::{Database, LibraryConfig, ManualClock, RetryConfig, MIN_PASSWORD_HASH_COST};
use folio_library::{
    AccountStore, BookInput, Catalog, Ledger, NewAccount, PatronInput, Patrons, Registration,
    RegistrationRequest,
};
use parking_lot::Mutex;

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness so it only shows for
/// failing tests
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a subscriber that records this thread's log output
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock()).into_owned();
    (result, logs)
}

/// Every service over one ephemeral database with a manual clock
pub struct Library {
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
    pub identity: Arc<AccountStore>,
    pub catalog: Catalog,
    pub patrons: Patrons,
    pub registration: Registration,
    pub ledger: Ledger,
}

/// Generous retries and the cheapest bcrypt cost
pub fn test_config() -> LibraryConfig {
    LibraryConfig {
        password_hash_cost: MIN_PASSWORD_HASH_COST,
        retry: RetryConfig::default().with_max_retries(64),
        ..LibraryConfig::default()
    }
}

impl Library {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: LibraryConfig) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap(),
        ));
        let db = Database::builder()
            .config(config)
            .clock(clock.clone())
            .build()
            .unwrap();
        let identity = Arc::new(AccountStore::new(db.clone()));
        Library {
            catalog: Catalog::new(db.clone()),
            patrons: Patrons::new(db.clone(), identity.clone()),
            registration: Registration::new(db.clone(), identity.clone()),
            ledger: Ledger::new(db.clone()),
            identity,
            clock,
            db,
        }
    }

    /// Register a patron whose username and student id derive from `name`
    pub fn register(&self, name: &str) -> Patron {
        self.registration
            .register(RegistrationRequest {
                account: NewAccount::new(name, format!("{name}@campus.edu"), "correct horse"),
                patron: PatronInput::new(format!("ST-{name}")),
            })
            .unwrap()
    }

    pub fn add_book(&self, title: &str, isbn: &str, stock: u32) -> Book {
        self.catalog
            .create_book(BookInput::new(title, isbn, stock))
            .unwrap()
    }

    pub fn stock(&self, id: BookId) -> u32 {
        self.catalog.get_book(id).unwrap().stock
    }
}

/// A valid 13-digit ISBN distinct for every `n`
pub fn isbn(n: u64) -> String {
    format!("978{n:010}")
}
