//! Catalog: authors and books
//!
//! ISBN uniqueness is enforced through an index row (`TypeTag::IsbnIndex`)
//! read inside the same unit of work that writes the book, so two
//! concurrent creates of one ISBN serialize at commit and the loser is
//! retried into `DuplicateIsbn`.
//!
//! Books hold a weak reference to their author. Deleting an author clears
//! the reference on every book instead of deleting them. Deleting a book is
//! refused while any loan, returned or not, still points at it.

use std::sync::Arc;

use chrono::NaiveDate;
use folio_concurrency::TransactionContext;
use folio_core::limits::{validate_required, MAX_NAME_LEN, MAX_TITLE_LEN};
use folio_core::model::validate_isbn;
use folio_core::{
    Author, AuthorId, Book, BookId, Key, LibraryError, LibraryResult, Record, TypeTag,
};
use folio_engine::Database;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::extensions::RecordTxnExt;

/// Writable author fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorInput {
    /// Display name
    pub name: String,
    /// Date of birth
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Free-form biography
    #[serde(default)]
    pub biography: Option<String>,
}

impl AuthorInput {
    /// Input with just a name
    pub fn named(name: impl Into<String>) -> Self {
        AuthorInput {
            name: name.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> LibraryResult<()> {
        validate_required("name", &self.name, MAX_NAME_LEN)
    }
}

/// Writable book fields
///
/// Updates replace every field, `stock` included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInput {
    /// Title
    pub title: String,
    /// 13-digit ISBN
    pub isbn: String,
    /// Publication date
    #[serde(default)]
    pub published_date: Option<NaiveDate>,
    /// Author reference, must name an existing author
    #[serde(default)]
    pub author_id: Option<AuthorId>,
    /// Copies on the shelf
    pub stock: u32,
}

impl BookInput {
    /// Input with a title, ISBN and stock and no author
    pub fn new(title: impl Into<String>, isbn: impl Into<String>, stock: u32) -> Self {
        BookInput {
            title: title.into(),
            isbn: isbn.into(),
            published_date: None,
            author_id: None,
            stock,
        }
    }

    /// Attach an author
    pub fn by(mut self, author_id: AuthorId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    fn validate(&self) -> LibraryResult<()> {
        validate_required("title", &self.title, MAX_TITLE_LEN)?;
        validate_isbn(&self.isbn)
    }
}

/// Author and book CRUD
///
/// Stateless: holds only `Arc<Database>`, so it is cheap to clone and can
/// be shared across threads.
#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
}

impl Catalog {
    /// Create a catalog over `db`
    pub fn new(db: Arc<Database>) -> Self {
        Catalog { db }
    }

    /// Underlying database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // ========================================================================
    // Authors
    // ========================================================================

    /// Create an author
    pub fn create_author(&self, input: AuthorInput) -> LibraryResult<Author> {
        input.validate()?;
        let id = AuthorId::new(self.db.next_id(TypeTag::Author));
        let author = Author {
            id,
            name: input.name,
            birth_date: input.birth_date,
            biography: input.biography,
        };
        let created = self
            .db
            .transaction_with_retry(|txn| {
                txn.put_record(author.clone())?;
                Ok(author.clone())
            })
            .map_err(log_unexpected("create_author"))?;
        info!(target: "folio::catalog", author_id = %id, "Author created");
        Ok(created)
    }

    /// Get an author
    pub fn get_author(&self, id: AuthorId) -> LibraryResult<Author> {
        self
            .db
            .transaction(|txn| txn.require::<Author>(id))
            .map_err(log_unexpected("get_author"))
    }

    /// All authors, by name then id
    pub fn list_authors(&self) -> LibraryResult<Vec<Author>> {
        let mut authors = self
            .db
            .transaction(|txn| txn.scan_records::<Author>())
            .map_err(log_unexpected("list_authors"))?;
        authors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(authors)
    }

    /// Replace an author's fields
    pub fn update_author(&self, id: AuthorId, input: AuthorInput) -> LibraryResult<Author> {
        input.validate()?;
        let updated = self
            .db
            .transaction_with_retry(|txn| {
                let mut author = txn.require::<Author>(id)?;
                author.name = input.name.clone();
                author.birth_date = input.birth_date;
                author.biography = input.biography.clone();
                txn.put_record(author.clone())?;
                Ok(author)
            })
            .map_err(log_unexpected("update_author"))?;
        info!(target: "folio::catalog", author_id = %id, "Author updated");
        Ok(updated)
    }

    /// Delete an author, detaching their books
    ///
    /// Returns the number of books whose author reference was cleared.
    pub fn delete_author(&self, id: AuthorId) -> LibraryResult<usize> {
        let detached = self
            .db
            .transaction_with_retry(|txn| {
                txn.require::<Author>(id)?;
                let mut detached = 0;
                for mut book in txn.scan_records::<Book>()? {
                    if book.author_id == Some(id) {
                        book.author_id = None;
                        txn.put_record(book)?;
                        detached += 1;
                    }
                }
                txn.delete_record::<Author>(id)?;
                Ok(detached)
            })
            .map_err(log_unexpected("delete_author"))?;
        info!(
            target: "folio::catalog",
            author_id = %id,
            detached,
            "Author deleted"
        );
        Ok(detached)
    }

    // ========================================================================
    // Books
    // ========================================================================

    /// Create a book
    ///
    /// Fails with `DuplicateIsbn` if the ISBN is taken and `NotFound` if the
    /// author does not exist.
    pub fn create_book(&self, input: BookInput) -> LibraryResult<Book> {
        input.validate()?;
        let id = BookId::new(self.db.next_id(TypeTag::Book));
        let created = self
            .db
            .transaction_with_retry(|txn| {
                if let Some(author_id) = input.author_id {
                    pin_author(txn, author_id)?;
                }
                let isbn_key = Key::isbn(&input.isbn);
                if txn.get_ref(&isbn_key)?.is_some() {
                    return Err(LibraryError::DuplicateIsbn {
                        isbn: input.isbn.clone(),
                    });
                }
                let book = Book {
                    id,
                    title: input.title.clone(),
                    isbn: input.isbn.clone(),
                    published_date: input.published_date,
                    author_id: input.author_id,
                    stock: input.stock,
                };
                txn.put_ref(isbn_key, id.as_u64())?;
                txn.put_record(book.clone())?;
                Ok(book)
            })
            .map_err(log_unexpected("create_book"))?;
        info!(
            target: "folio::catalog",
            book_id = %id,
            isbn = %created.isbn,
            stock = created.stock,
            "Book created"
        );
        Ok(created)
    }

    /// Get a book
    pub fn get_book(&self, id: BookId) -> LibraryResult<Book> {
        self
            .db
            .transaction(|txn| txn.require::<Book>(id))
            .map_err(log_unexpected("get_book"))
    }

    /// Look a book up by ISBN
    pub fn find_by_isbn(&self, isbn: &str) -> LibraryResult<Book> {
        self
            .db
            .transaction(|txn| {
                let id = txn
                    .get_ref(&Key::isbn(isbn))?
                    .ok_or_else(|| LibraryError::not_found(Book::ENTITY, isbn))?;
                txn.require::<Book>(BookId::new(id))
            })
            .map_err(log_unexpected("find_by_isbn"))
    }

    /// All books, by title then id
    pub fn list_books(&self) -> LibraryResult<Vec<Book>> {
        let mut books = self
            .db
            .transaction(|txn| txn.scan_records::<Book>())
            .map_err(log_unexpected("list_books"))?;
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    /// Replace every field of a book
    pub fn update_book(&self, id: BookId, input: BookInput) -> LibraryResult<Book> {
        input.validate()?;
        let updated = self
            .db
            .transaction_with_retry(|txn| {
                let mut book = txn.require::<Book>(id)?;
                if let Some(author_id) = input.author_id {
                    pin_author(txn, author_id)?;
                }
                if book.isbn != input.isbn {
                    let new_key = Key::isbn(&input.isbn);
                    if txn.get_ref(&new_key)?.is_some() {
                        return Err(LibraryError::DuplicateIsbn {
                            isbn: input.isbn.clone(),
                        });
                    }
                    txn.delete(Key::isbn(&book.isbn))?;
                    txn.put_ref(new_key, id.as_u64())?;
                }
                book.title = input.title.clone();
                book.isbn = input.isbn.clone();
                book.published_date = input.published_date;
                book.author_id = input.author_id;
                book.stock = input.stock;
                txn.put_record(book.clone())?;
                Ok(book)
            })
            .map_err(log_unexpected("update_book"))?;
        info!(target: "folio::catalog", book_id = %id, stock = updated.stock, "Book updated");
        Ok(updated)
    }

    /// Delete a book that no loan references
    pub fn delete_book(&self, id: BookId) -> LibraryResult<()> {
        self
            .db
            .transaction_with_retry(|txn| {
                let book = txn.require::<Book>(id)?;
                let loans = txn.scan_refs(&Key::book_loans(id))?.len();
                if loans > 0 {
                    return Err(LibraryError::ReferencedByTransaction {
                        book_id: id.as_u64(),
                        loans,
                    });
                }
                txn.delete(Key::isbn(&book.isbn))?;
                txn.delete_record::<Book>(id)
            })
            .map_err(log_unexpected("delete_book"))?;
        info!(target: "folio::catalog", book_id = %id, "Book deleted");
        Ok(())
    }

    // ========================================================================
    // Stock
    // ========================================================================

    /// Take one copy of a book off the shelf inside `txn`
    pub fn take_copy(txn: &mut TransactionContext, id: BookId) -> LibraryResult<Book> {
        let mut book = txn.require::<Book>(id)?;
        book.take_copy()?;
        txn.put_record(book.clone())?;
        Ok(book)
    }

    /// Put one copy of a book back inside `txn`
    pub fn restore_copy(txn: &mut TransactionContext, id: BookId) -> LibraryResult<Book> {
        let mut book = txn.require::<Book>(id)?;
        book.restore_copy()?;
        txn.put_record(book.clone())?;
        Ok(book)
    }
}

/// Pass an error through, logging it unless it is a business outcome or a
/// conflict the retry budget already reported
fn log_unexpected(operation: &'static str) -> impl Fn(LibraryError) -> LibraryError {
    move |e| {
        if !e.is_domain() && !e.is_conflict() {
            error!(target: "folio::catalog", operation, error = %e, "Catalog operation failed");
        }
        e
    }
}

/// Require an author and rewrite it unchanged
///
/// The rewrite bumps the author's version, so a concurrent `delete_author`
/// that scanned books before this commit fails validation and rescans.
fn pin_author(txn: &mut TransactionContext, id: AuthorId) -> LibraryResult<()> {
    let author = txn.require::<Author>(id)?;
    txn.put_record(author)
}
