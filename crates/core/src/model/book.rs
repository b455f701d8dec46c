//! Book records

use crate::error::{LibraryError, LibraryResult};
use crate::limits::ISBN_LEN;
use crate::types::{AuthorId, BookId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A book title held by the library
///
/// `stock` counts the copies currently on the shelf. It is unsigned, so the
/// non-negative invariant is carried by the type and every decrement goes
/// through [`Book::take_copy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Primary key
    pub id: BookId,
    /// Title
    pub title: String,
    /// Unique 13-digit ISBN
    pub isbn: String,
    /// Publication date
    pub published_date: Option<NaiveDate>,
    /// Weak reference to the author
    pub author_id: Option<AuthorId>,
    /// Available copies
    pub stock: u32,
}

impl Book {
    /// Remove one copy from the shelf
    pub fn take_copy(&mut self) -> LibraryResult<()> {
        match self.stock.checked_sub(1) {
            Some(stock) => {
                self.stock = stock;
                Ok(())
            }
            None => Err(LibraryError::OutOfStock {
                book_id: self.id.as_u64(),
                title: self.title.clone(),
            }),
        }
    }

    /// Put one copy back on the shelf
    pub fn restore_copy(&mut self) -> LibraryResult<()> {
        self.stock = self.stock.checked_add(1).ok_or_else(|| {
            LibraryError::internal(format!("stock overflow on book {}", self.id))
        })?;
        Ok(())
    }
}

/// Check that an ISBN is exactly 13 ASCII digits
///
/// Check digits are not verified.
pub fn validate_isbn(isbn: &str) -> LibraryResult<()> {
    if isbn.len() != ISBN_LEN || !isbn.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LibraryError::validation(
            "isbn",
            format!("ISBN must be a {ISBN_LEN}-digit number, got '{isbn}'"),
        ));
    }
    Ok(())
}
