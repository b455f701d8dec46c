//! Author records

use crate::types::AuthorId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An author of one or more books
///
/// Books reference authors weakly: deleting an author clears the reference
/// on its books instead of deleting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Primary key
    pub id: AuthorId,
    /// Display name
    pub name: String,
    /// Date of birth, if known
    pub birth_date: Option<NaiveDate>,
    /// Short biography
    pub biography: Option<String>,
}
