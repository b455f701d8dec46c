//! Loan ledger: borrow and return
//!
//! # Unit of work
//!
//! A borrow reads the patron, the book and the (patron, book) active-loan
//! index row, then writes the decremented book, the new loan and three
//! index rows. All of it commits under one version or not at all. Two
//! borrows racing for the last copy both read the book; the first to
//! commit wins, the other fails validation, is retried against the new
//! state and sees `stock == 0`.
//!
//! A return reads and rewrites the loan, so two concurrent returns of one
//! loan serialize the same way: the retried loser sees `Returned` and fails
//! with `AlreadyReturned`. Stock is incremented once.
//!
//! # Index rows
//!
//! | Row | Written | Removed |
//! |-----|---------|---------|
//! | `ActiveLoanIndex(patron, book)` | borrow | return |
//! | `BookLoanIndex(book, loan)` | borrow | patron cascade |
//! | `PatronLoanIndex(patron, loan)` | borrow | patron cascade |
//!
//! # Overdue
//!
//! Never stored. Computed from the database clock on every read.

use std::sync::Arc;

use folio_concurrency::TransactionContext;
use folio_core::{
    Book, BookId, Key, LibraryError, LibraryResult, Loan, LoanId, Patron, PatronId, TypeTag,
};
use folio_engine::Database;
use serde::Serialize;
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::extensions::RecordTxnExt;

/// A loan paired with its computed overdue flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanView {
    /// The stored loan
    #[serde(flatten)]
    pub loan: Loan,
    /// Borrowed and past its due date at read time
    pub is_overdue: bool,
}

/// Borrow/return operations and loan queries
#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
}

impl Ledger {
    /// Create a ledger over `db`
    pub fn new(db: Arc<Database>) -> Self {
        Ledger { db }
    }

    /// Borrow one copy of a book inside `txn`
    ///
    /// Checks run in this order: patron exists and is active, book exists,
    /// no outstanding loan of this book by this patron, a copy is on the
    /// shelf.
    pub fn borrow_in(
        &self,
        txn: &mut TransactionContext,
        patron_id: PatronId,
        book_id: BookId,
    ) -> LibraryResult<Loan> {
        let patron = txn.require::<Patron>(patron_id)?;
        if !patron.active {
            return Err(LibraryError::PatronInactive {
                patron_id: patron_id.as_u64(),
            });
        }
        txn.require::<Book>(book_id)?;

        let active_key = Key::active_loan(patron_id, book_id);
        if txn.get_ref(&active_key)?.is_some() {
            return Err(LibraryError::DuplicateActiveBorrow {
                patron_id: patron_id.as_u64(),
                book_id: book_id.as_u64(),
            });
        }
        Catalog::take_copy(txn, book_id)?;

        let loan_id = LoanId::new(self.db.next_id(TypeTag::Loan));
        let loan = Loan::open(
            loan_id,
            book_id,
            patron_id,
            self.db.now(),
            self.db.borrow_period(),
        );
        txn.put_record(loan.clone())?;
        txn.put_ref(active_key, loan_id.as_u64())?;
        txn.put_ref(Key::book_loan(book_id, loan_id), loan_id.as_u64())?;
        txn.put_ref(Key::patron_loan(patron_id, loan_id), loan_id.as_u64())?;
        // Rewriting the patron orders this borrow against a concurrent
        // cascade delete, which scans the patron's loans.
        txn.put_record(patron)?;
        Ok(loan)
    }

    /// Borrow one copy of a book
    ///
    /// Fails with `NotFound`, `PatronInactive`, `DuplicateActiveBorrow` or
    /// `OutOfStock`; on failure nothing is written.
    pub fn borrow(&self, patron_id: PatronId, book_id: BookId) -> LibraryResult<Loan> {
        let loan = self
            .db
            .transaction_with_retry(|txn| self.borrow_in(txn, patron_id, book_id))
            .map_err(log_unexpected("borrow"))?;
        info!(
            target: "folio::ledger",
            loan_id = %loan.id,
            patron_id = %patron_id,
            book_id = %book_id,
            due = %loan.due_date,
            "Book borrowed"
        );
        Ok(loan)
    }

    /// Return a borrowed copy inside `txn`
    pub fn return_in(
        &self,
        txn: &mut TransactionContext,
        patron_id: PatronId,
        loan_id: LoanId,
    ) -> LibraryResult<Loan> {
        let mut loan = txn.require::<Loan>(loan_id)?;
        if loan.patron_id != patron_id {
            return Err(LibraryError::NotOwner {
                loan_id: loan_id.as_u64(),
                patron_id: patron_id.as_u64(),
            });
        }
        loan.mark_returned(self.db.now())?;
        Catalog::restore_copy(txn, loan.book_id)?;
        txn.delete(Key::active_loan(patron_id, loan.book_id))?;
        txn.put_record(loan.clone())?;
        Ok(loan)
    }

    /// Return a borrowed copy
    ///
    /// Fails with `NotFound`, `NotOwner` or `AlreadyReturned`.
    pub fn return_book(&self, patron_id: PatronId, loan_id: LoanId) -> LibraryResult<Loan> {
        let loan = self
            .db
            .transaction_with_retry(|txn| self.return_in(txn, patron_id, loan_id))
            .map_err(log_unexpected("return_book"))?;
        info!(
            target: "folio::ledger",
            loan_id = %loan_id,
            patron_id = %patron_id,
            book_id = %loan.book_id,
            "Book returned"
        );
        Ok(loan)
    }

    /// Get a loan
    pub fn get_loan(&self, loan_id: LoanId) -> LibraryResult<Loan> {
        self
            .db
            .transaction(|txn| txn.require::<Loan>(loan_id))
            .map_err(log_unexpected("get_loan"))
    }

    /// A patron's loans, newest first
    pub fn list_for_patron(&self, patron_id: PatronId) -> LibraryResult<Vec<Loan>> {
        let mut loans = self
            .db
            .transaction(|txn| {
                txn.require::<Patron>(patron_id)?;
                let mut loans = Vec::new();
                for id in txn.scan_refs(&Key::patron_loans(patron_id))? {
                    loans.push(txn.require::<Loan>(LoanId::new(id))?);
                }
                Ok(loans)
            })
            .map_err(log_unexpected("list_for_patron"))?;
        newest_first(&mut loans);
        Ok(loans)
    }

    /// Every loan, newest first
    pub fn list_all(&self) -> LibraryResult<Vec<Loan>> {
        let mut loans = self
            .db
            .transaction(|txn| txn.scan_records::<Loan>())
            .map_err(log_unexpected("list_all"))?;
        newest_first(&mut loans);
        Ok(loans)
    }

    /// Borrowed and past its due date, by the database clock
    pub fn is_overdue(&self, loan: &Loan) -> bool {
        loan.is_overdue_at(self.db.now())
    }

    /// Every overdue loan, oldest due date first
    pub fn list_overdue(&self) -> LibraryResult<Vec<Loan>> {
        let now = self.db.now();
        let mut loans: Vec<Loan> = self
            .db
            .transaction(|txn| txn.scan_records::<Loan>())
            .map_err(log_unexpected("list_overdue"))?
            .into_iter()
            .filter(|loan| loan.is_overdue_at(now))
            .collect();
        loans.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(loans)
    }

    /// Pair a loan with its overdue flag
    pub fn loan_view(&self, loan: Loan) -> LoanView {
        let is_overdue = self.is_overdue(&loan);
        LoanView { loan, is_overdue }
    }
}

fn log_unexpected(operation: &'static str) -> impl Fn(LibraryError) -> LibraryError {
    move |e| {
        if !e.is_domain() && !e.is_conflict() {
            error!(target: "folio::ledger", operation, error = %e, "Ledger operation failed");
        }
        e
    }
}

fn newest_first(loans: &mut [Loan]) {
    loans.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BookInput;
    use crate::identity::{AccountStore, NewAccount};
    use crate::patrons::{PatronInput, Patrons};
    use crate::registration::{Registration, RegistrationRequest};
    use chrono::{Duration, TimeZone, Utc};
    use folio_core::LoanStatus;
    use folio_engine::{Clock, LibraryConfig, ManualClock, MIN_PASSWORD_HASH_COST};

    struct Fixture {
        clock: Arc<ManualClock>,
        catalog: Catalog,
        patrons: Patrons,
        registration: Registration,
        ledger: Ledger,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let db = Database::builder()
            .config(LibraryConfig {
                password_hash_cost: MIN_PASSWORD_HASH_COST,
                ..Default::default()
            })
            .clock(clock.clone())
            .build()
            .unwrap();
        let identity = Arc::new(AccountStore::new(db.clone()));
        Fixture {
            clock,
            catalog: Catalog::new(db.clone()),
            patrons: Patrons::new(db.clone(), identity.clone()),
            registration: Registration::new(db.clone(), identity),
            ledger: Ledger::new(db),
        }
    }

    impl Fixture {
        fn patron(&self, name: &str) -> PatronId {
            self.registration
                .register(RegistrationRequest {
                    account: NewAccount::new(name, format!("{name}@uni.edu"), "pw"),
                    patron: PatronInput::new(format!("S-{name}")),
                })
                .unwrap()
                .id
        }

        fn book(&self, isbn: &str, stock: u32) -> BookId {
            self.catalog
                .create_book(BookInput::new("Dune", isbn, stock))
                .unwrap()
                .id
        }

        fn stock(&self, id: BookId) -> u32 {
            self.catalog.get_book(id).unwrap().stock
        }
    }

    #[test]
    fn test_borrow_sets_dates_and_decrements() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 2);

        let loan = f.ledger.borrow(p, b).unwrap();
        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(loan.due_date - loan.borrow_date, Duration::days(14));
        assert!(loan.return_date.is_none());
        assert_eq!(f.stock(b), 1);
    }

    #[test]
    fn test_borrow_out_of_stock_changes_nothing() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 0);

        let err = f.ledger.borrow(p, b).unwrap_err();
        assert!(matches!(err, LibraryError::OutOfStock { .. }));
        assert_eq!(f.stock(b), 0);
        assert!(f.ledger.list_for_patron(p).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_borrow_then_borrow_after_return() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 3);

        let loan = f.ledger.borrow(p, b).unwrap();
        let err = f.ledger.borrow(p, b).unwrap_err();
        assert_eq!(
            err,
            LibraryError::DuplicateActiveBorrow {
                patron_id: p.as_u64(),
                book_id: b.as_u64()
            }
        );
        assert_eq!(f.stock(b), 2);

        f.ledger.return_book(p, loan.id).unwrap();
        f.ledger.borrow(p, b).unwrap();
        assert_eq!(f.stock(b), 2);
    }

    #[test]
    fn test_return_rules() {
        let f = fixture();
        let ada = f.patron("ada");
        let bob = f.patron("bob");
        let b = f.book("9780441013593", 1);
        let loan = f.ledger.borrow(ada, b).unwrap();

        let err = f.ledger.return_book(bob, loan.id).unwrap_err();
        assert!(matches!(err, LibraryError::NotOwner { .. }));

        f.clock.advance(Duration::days(3));
        let returned = f.ledger.return_book(ada, loan.id).unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert_eq!(returned.return_date, Some(f.clock.now()));
        assert_eq!(f.stock(b), 1);

        let err = f.ledger.return_book(ada, loan.id).unwrap_err();
        assert_eq!(
            err,
            LibraryError::AlreadyReturned {
                loan_id: loan.id.as_u64()
            }
        );
        assert_eq!(f.stock(b), 1);

        let err = f.ledger.return_book(ada, LoanId::new(999)).unwrap_err();
        assert_eq!(err, LibraryError::not_found("loan", 999));
    }

    #[test]
    fn test_missing_patron_or_book() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 1);
        assert_eq!(
            f.ledger.borrow(PatronId::new(77), b).unwrap_err(),
            LibraryError::not_found("patron", 77)
        );
        assert_eq!(
            f.ledger.borrow(p, BookId::new(77)).unwrap_err(),
            LibraryError::not_found("book", 77)
        );
    }

    #[test]
    fn test_inactive_patron_cannot_borrow_but_can_return() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 2);
        let loan = f.ledger.borrow(p, b).unwrap();

        f.patrons.deactivate_patron(p).unwrap();
        let other = f.book("9780441013594", 2);
        assert_eq!(
            f.ledger.borrow(p, other).unwrap_err(),
            LibraryError::PatronInactive {
                patron_id: p.as_u64()
            }
        );
        f.ledger.return_book(p, loan.id).unwrap();
        assert_eq!(f.stock(b), 2);
    }

    #[test]
    fn test_overdue_follows_clock() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 1);
        let loan = f.ledger.borrow(p, b).unwrap();

        f.clock.advance(Duration::days(14));
        assert!(!f.ledger.is_overdue(&loan));
        f.clock.advance(Duration::seconds(1));
        assert!(f.ledger.is_overdue(&loan));
        assert_eq!(f.ledger.list_overdue().unwrap(), vec![loan.clone()]);
        assert!(f.ledger.loan_view(loan.clone()).is_overdue);

        let returned = f.ledger.return_book(p, loan.id).unwrap();
        assert!(!f.ledger.is_overdue(&returned));
        assert!(f.ledger.list_overdue().unwrap().is_empty());
    }

    #[test]
    fn test_list_for_patron_newest_first() {
        let f = fixture();
        let p = f.patron("ada");
        let b1 = f.book("1000000000001", 1);
        let b2 = f.book("1000000000002", 1);
        let first = f.ledger.borrow(p, b1).unwrap();
        f.clock.advance(Duration::hours(1));
        let second = f.ledger.borrow(p, b2).unwrap();

        let ids: Vec<LoanId> = f
            .ledger
            .list_for_patron(p)
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(f.ledger.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_loan_view_serializes_flat() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 1);
        let loan = f.ledger.borrow(p, b).unwrap();
        let json = serde_json::to_value(f.ledger.loan_view(loan)).unwrap();
        assert_eq!(json["status"], "Borrowed");
        assert_eq!(json["is_overdue"], false);
        assert!(json.get("loan").is_none());
    }

    #[test]
    fn test_borrow_and_return_compose_in_one_unit_of_work() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 1);
        let db = f.catalog.database().clone();

        let loan = db
            .transaction(|txn| {
                let loan = f.ledger.borrow_in(txn, p, b)?;
                f.ledger.return_in(txn, p, loan.id)
            })
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Returned);
        assert_eq!(f.stock(b), 1);
    }

    #[test]
    fn test_cascade_delete_removes_loans() {
        let f = fixture();
        let p = f.patron("ada");
        let b = f.book("9780441013593", 2);
        let open = f.ledger.borrow(p, b).unwrap();
        let b2 = f.book("9780441013594", 1);
        let closed = f.ledger.borrow(p, b2).unwrap();
        f.ledger.return_book(p, closed.id).unwrap();

        let report = f.patrons.delete_patron(p).unwrap();
        assert_eq!(report.loans_removed, 2);
        assert_eq!(report.outstanding_loans, 1);
        assert!(f.ledger.list_all().unwrap().is_empty());
        assert!(matches!(
            f.ledger.get_loan(open.id),
            Err(LibraryError::NotFound { .. })
        ));
        // Copies out with the deleted patron are not restored
        assert_eq!(f.stock(b), 1);
        // No loan references the books any more
        f.catalog.delete_book(b2).unwrap();
    }
}
