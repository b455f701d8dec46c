//! Patron (student profile) store
//!
//! A patron is bound 1:1 to an identity account through the
//! `AccountPatronIndex` row; `StudentIdIndex` keeps student numbers unique.
//!
//! Two ways to retire a patron:
//! - [`Patrons::delete_patron`]: hard delete. Removes the profile, its
//!   account and every loan it ever made, outstanding or not. Stock is not
//!   restored for outstanding loans; the copies are treated as lost.
//! - [`Patrons::deactivate_patron`]: soft delete. History stays intact, the
//!   patron can still return books but cannot borrow.

use std::sync::Arc;

use chrono::NaiveDate;
use folio_concurrency::TransactionContext;
use folio_core::limits::{
    validate_optional, validate_required, MAX_DEPARTMENT_LEN, MAX_STUDENT_ID_LEN,
};
use folio_core::{
    Account, AccountId, Key, LibraryError, LibraryResult, Loan, LoanId, Patron, PatronId, Record,
    TypeTag,
};
use folio_engine::Database;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::extensions::RecordTxnExt;
use crate::identity::IdentityProvider;

/// Writable patron fields
///
/// Updates replace every field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatronInput {
    /// Unique institutional student number
    pub student_id: String,
    /// Academic department
    #[serde(default)]
    pub department: Option<String>,
    /// Enrollment date
    #[serde(default)]
    pub enrollment_date: Option<NaiveDate>,
}

impl PatronInput {
    /// Input with just a student id
    pub fn new(student_id: impl Into<String>) -> Self {
        PatronInput {
            student_id: student_id.into(),
            ..Default::default()
        }
    }

    /// Set the department
    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Check field rules
    pub fn validate(&self) -> LibraryResult<()> {
        validate_required("student_id", &self.student_id, MAX_STUDENT_ID_LEN)?;
        validate_optional(
            "department",
            self.department.as_deref(),
            MAX_DEPARTMENT_LEN,
        )
    }
}

/// What a cascading delete removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    /// Account that was removed
    pub account_id: AccountId,
    /// Patron profile that was removed, if the account had one
    pub patron_id: Option<PatronId>,
    /// Loan records removed
    pub loans_removed: usize,
    /// Of those, loans still Borrowed at delete time
    pub outstanding_loans: usize,
}

/// Patron CRUD and lifecycle
#[derive(Clone)]
pub struct Patrons {
    db: Arc<Database>,
    identity: Arc<dyn IdentityProvider>,
}

impl Patrons {
    /// Create a patron store over `db` using `identity` for accounts
    pub fn new(db: Arc<Database>, identity: Arc<dyn IdentityProvider>) -> Self {
        Patrons { db, identity }
    }

    /// Create a profile for an existing account inside `txn`
    pub fn create_in(
        &self,
        txn: &mut TransactionContext,
        account_id: AccountId,
        input: &PatronInput,
    ) -> LibraryResult<Patron> {
        input.validate()?;
        if self.identity.get_account(txn, account_id)?.is_none() {
            return Err(LibraryError::not_found(Account::ENTITY, account_id));
        }
        let profile_key = Key::account_patron(account_id);
        if txn.get_ref(&profile_key)?.is_some() {
            return Err(LibraryError::validation(
                "account",
                format!("account {account_id} already has a patron profile"),
            ));
        }
        let student_key = Key::student_id(&input.student_id);
        if txn.get_ref(&student_key)?.is_some() {
            return Err(LibraryError::DuplicatePatronId {
                student_id: input.student_id.clone(),
            });
        }

        let id = PatronId::new(self.db.next_id(TypeTag::Patron));
        let patron = Patron {
            id,
            account_id,
            student_id: input.student_id.clone(),
            department: input.department.clone(),
            enrollment_date: input.enrollment_date,
            active: true,
        };
        txn.put_ref(profile_key, id.as_u64())?;
        txn.put_ref(student_key, id.as_u64())?;
        txn.put_record(patron.clone())?;
        Ok(patron)
    }

    /// Create a profile for an existing account
    pub fn create_patron(
        &self,
        account_id: AccountId,
        input: PatronInput,
    ) -> LibraryResult<Patron> {
        let patron = self
            .db
            .transaction_with_retry(|txn| self.create_in(txn, account_id, &input))
            .map_err(log_unexpected("create_patron"))?;
        info!(
            target: "folio::patrons",
            patron_id = %patron.id,
            account_id = %account_id,
            "Patron created"
        );
        Ok(patron)
    }

    /// Get a patron
    pub fn get_patron(&self, id: PatronId) -> LibraryResult<Patron> {
        self
            .db
            .transaction(|txn| txn.require::<Patron>(id))
            .map_err(log_unexpected("get_patron"))
    }

    /// The profile owned by an account
    pub fn find_by_account(&self, account_id: AccountId) -> LibraryResult<Patron> {
        self
            .db
            .transaction(|txn| {
                let id = txn
                    .get_ref(&Key::account_patron(account_id))?
                    .ok_or_else(|| {
                        LibraryError::not_found(
                            Patron::ENTITY,
                            format!("for account {account_id}"),
                        )
                    })?;
                txn.require::<Patron>(PatronId::new(id))
            })
            .map_err(log_unexpected("find_by_account"))
    }

    /// Look a patron up by student number
    pub fn find_by_student_id(&self, student_id: &str) -> LibraryResult<Patron> {
        self
            .db
            .transaction(|txn| {
                let id = txn
                    .get_ref(&Key::student_id(student_id))?
                    .ok_or_else(|| LibraryError::not_found(Patron::ENTITY, student_id))?;
                txn.require::<Patron>(PatronId::new(id))
            })
            .map_err(log_unexpected("find_by_student_id"))
    }

    /// All patrons, by id
    pub fn list_patrons(&self) -> LibraryResult<Vec<Patron>> {
        self
            .db
            .transaction(|txn| txn.scan_records::<Patron>())
            .map_err(log_unexpected("list_patrons"))
    }

    /// Replace a patron's profile fields
    ///
    /// The account and the active flag are left alone.
    pub fn update_patron(&self, id: PatronId, input: PatronInput) -> LibraryResult<Patron> {
        input.validate()?;
        let patron = self
            .db
            .transaction_with_retry(|txn| {
                let mut patron = txn.require::<Patron>(id)?;
                if patron.student_id != input.student_id {
                    let new_key = Key::student_id(&input.student_id);
                    if txn.get_ref(&new_key)?.is_some() {
                        return Err(LibraryError::DuplicatePatronId {
                            student_id: input.student_id.clone(),
                        });
                    }
                    txn.delete(Key::student_id(&patron.student_id))?;
                    txn.put_ref(new_key, id.as_u64())?;
                }
                patron.student_id = input.student_id.clone();
                patron.department = input.department.clone();
                patron.enrollment_date = input.enrollment_date;
                txn.put_record(patron.clone())?;
                Ok(patron)
            })
            .map_err(log_unexpected("update_patron"))?;
        info!(target: "folio::patrons", patron_id = %id, "Patron updated");
        Ok(patron)
    }

    /// Stop a patron from borrowing, keeping their history
    pub fn deactivate_patron(&self, id: PatronId) -> LibraryResult<Patron> {
        let patron = self.set_active(id, false)?;
        info!(target: "folio::patrons", patron_id = %id, "Patron deactivated");
        Ok(patron)
    }

    /// Allow a deactivated patron to borrow again
    pub fn reactivate_patron(&self, id: PatronId) -> LibraryResult<Patron> {
        let patron = self.set_active(id, true)?;
        info!(target: "folio::patrons", patron_id = %id, "Patron reactivated");
        Ok(patron)
    }

    fn set_active(&self, id: PatronId, active: bool) -> LibraryResult<Patron> {
        self
            .db
            .transaction_with_retry(|txn| {
                let mut patron = txn.require::<Patron>(id)?;
                if patron.active != active {
                    patron.active = active;
                    txn.put_record(patron.clone())?;
                }
                Ok(patron)
            })
            .map_err(log_unexpected("set_active"))
    }

    /// Hard-delete a patron with its account and all its loans
    pub fn delete_patron(&self, id: PatronId) -> LibraryResult<CascadeReport> {
        let report = self
            .db
            .transaction_with_retry(|txn| {
                let patron = txn.require::<Patron>(id)?;
                self.cascade_in(txn, patron)
            })
            .map_err(log_unexpected("delete_patron"))?;
        log_cascade(&report);
        Ok(report)
    }

    /// Delete an account, cascading to its patron profile if it has one
    pub fn delete_account(&self, account_id: AccountId) -> LibraryResult<CascadeReport> {
        let report = self
            .db
            .transaction_with_retry(|txn| {
                match txn.get_ref(&Key::account_patron(account_id))? {
                    Some(patron_id) => {
                        let patron = txn.require::<Patron>(PatronId::new(patron_id))?;
                        self.cascade_in(txn, patron)
                    }
                    None => {
                        if !self.identity.delete_account(txn, account_id)? {
                            return Err(LibraryError::not_found(Account::ENTITY, account_id));
                        }
                        Ok(CascadeReport {
                            account_id,
                            patron_id: None,
                            loans_removed: 0,
                            outstanding_loans: 0,
                        })
                    }
                }
            })
            .map_err(log_unexpected("delete_account"))?;
        log_cascade(&report);
        Ok(report)
    }

    fn cascade_in(
        &self,
        txn: &mut TransactionContext,
        patron: Patron,
    ) -> LibraryResult<CascadeReport> {
        let mut loans_removed = 0;
        let mut outstanding_loans = 0;
        for loan_id in txn.scan_refs(&Key::patron_loans(patron.id))? {
            let loan_id = LoanId::new(loan_id);
            let loan = txn.require::<Loan>(loan_id)?;
            if loan.is_borrowed() {
                txn.delete(Key::active_loan(patron.id, loan.book_id))?;
                outstanding_loans += 1;
            }
            txn.delete(Key::book_loan(loan.book_id, loan_id))?;
            txn.delete(Key::patron_loan(patron.id, loan_id))?;
            txn.delete_record::<Loan>(loan_id)?;
            loans_removed += 1;
        }

        txn.delete(Key::student_id(&patron.student_id))?;
        txn.delete(Key::account_patron(patron.account_id))?;
        txn.delete_record::<Patron>(patron.id)?;
        self.identity.delete_account(txn, patron.account_id)?;

        Ok(CascadeReport {
            account_id: patron.account_id,
            patron_id: Some(patron.id),
            loans_removed,
            outstanding_loans,
        })
    }
}

/// Log failures that are neither business outcomes nor retryable conflicts
fn log_unexpected(operation: &'static str) -> impl Fn(LibraryError) -> LibraryError {
    move |e| {
        if !e.is_domain() && !e.is_conflict() {
            error!(target: "folio::patrons", operation, error = %e, "Patron operation failed");
        }
        e
    }
}

fn log_cascade(report: &CascadeReport) {
    if report.outstanding_loans > 0 {
        warn!(
            target: "folio::patrons",
            account_id = %report.account_id,
            patron_id = ?report.patron_id.map(PatronId::as_u64),
            loans_removed = report.loans_removed,
            outstanding = report.outstanding_loans,
            "Patron deleted with outstanding loans"
        );
    } else {
        info!(
            target: "folio::patrons",
            account_id = %report.account_id,
            patron_id = ?report.patron_id.map(PatronId::as_u64),
            loans_removed = report.loans_removed,
            "Account deleted"
        );
    }
}
