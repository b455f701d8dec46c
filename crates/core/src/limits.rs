//! Field length limits
//!
//! Enforced by the services before anything is written. Violations return
//! `ValidationError` naming the offending field.

use crate::error::{LibraryError, LibraryResult};

/// Maximum book title length in characters
pub const MAX_TITLE_LEN: usize = 255;

/// Maximum author, first and last name length
pub const MAX_NAME_LEN: usize = 255;

/// Exact ISBN length
pub const ISBN_LEN: usize = 13;

/// Maximum student id length
pub const MAX_STUDENT_ID_LEN: usize = 20;

/// Maximum department name length
pub const MAX_DEPARTMENT_LEN: usize = 100;

/// Maximum username length
pub const MAX_USERNAME_LEN: usize = 150;

/// Maximum email length
pub const MAX_EMAIL_LEN: usize = 254;

/// Require a non-blank value no longer than `max` characters
pub fn validate_required(field: &'static str, value: &str, max: usize) -> LibraryResult<()> {
    if value.trim().is_empty() {
        return Err(LibraryError::validation(field, "this field may not be blank"));
    }
    validate_len(field, value, max)
}

/// Check the length of an optional value
pub fn validate_optional(field: &'static str, value: Option<&str>, max: usize) -> LibraryResult<()> {
    match value {
        Some(v) => validate_len(field, v, max),
        None => Ok(()),
    }
}

fn validate_len(field: &'static str, value: &str, max: usize) -> LibraryResult<()> {
    let len = value.chars().count();
    if len > max {
        return Err(LibraryError::validation(
            field,
            format!("ensure this field has no more than {max} characters (it has {len})"),
        ));
    }
    Ok(())
}
