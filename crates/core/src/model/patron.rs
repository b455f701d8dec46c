//! Patron (student profile) records

use crate::types::{AccountId, PatronId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A student profile authorized to borrow books
///
/// Bound 1:1 to an identity account. `active` supports deactivation as an
/// alternative to the cascading hard delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patron {
    /// Primary key
    pub id: PatronId,
    /// Owning identity account
    pub account_id: AccountId,
    /// Unique institutional student number
    pub student_id: String,
    /// Academic department
    pub department: Option<String>,
    /// Enrollment date
    pub enrollment_date: Option<NaiveDate>,
    /// Deactivated patrons keep their history but cannot borrow
    pub active: bool,
}
