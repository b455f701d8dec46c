//! Loan records and the borrow/return state machine
//!
//! ```text
//! Borrowed ──return──> Returned (terminal)
//! ```
//!
//! Invariants:
//! - `return_date.is_some()` iff `status == Returned`
//! - `return_date >= borrow_date`
//! - `due_date == borrow_date + borrow period`, fixed at creation
//!
//! Overdue status is never stored; [`Loan::is_overdue_at`] derives it from
//! the current time on every read.

use crate::error::{LibraryError, LibraryResult};
use crate::types::{BookId, LoanId, PatronId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// The copy is with the patron
    Borrowed,
    /// The copy is back on the shelf
    Returned,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Borrowed => f.write_str("Borrowed"),
            LoanStatus::Returned => f.write_str("Returned"),
        }
    }
}

/// A single borrow of one book by one patron
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Primary key
    pub id: LoanId,
    /// Borrowed book
    pub book_id: BookId,
    /// Borrowing patron
    pub patron_id: PatronId,
    /// When the copy left the shelf
    pub borrow_date: DateTime<Utc>,
    /// When the copy is due back
    pub due_date: DateTime<Utc>,
    /// When the copy came back
    pub return_date: Option<DateTime<Utc>>,
    /// Current state
    pub status: LoanStatus,
}

impl Loan {
    /// Open a new loan in the `Borrowed` state
    pub fn open(
        id: LoanId,
        book_id: BookId,
        patron_id: PatronId,
        borrowed_at: DateTime<Utc>,
        period: Duration,
    ) -> Self {
        Loan {
            id,
            book_id,
            patron_id,
            borrow_date: borrowed_at,
            due_date: borrowed_at + period,
            return_date: None,
            status: LoanStatus::Borrowed,
        }
    }

    /// True while the copy is still out
    pub fn is_borrowed(&self) -> bool {
        self.status == LoanStatus::Borrowed
    }

    /// Overdue iff still borrowed and `now` is past the due date
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_borrowed() && now > self.due_date
    }

    /// Transition `Borrowed -> Returned`
    ///
    /// A return timestamp earlier than the borrow date (clock skew) is
    /// clamped to the borrow date.
    pub fn mark_returned(&mut self, at: DateTime<Utc>) -> LibraryResult<()> {
        if self.status == LoanStatus::Returned {
            return Err(LibraryError::AlreadyReturned {
                loan_id: self.id.as_u64(),
            });
        }
        self.status = LoanStatus::Returned;
        self.return_date = Some(at.max(self.borrow_date));
        Ok(())
    }
}
