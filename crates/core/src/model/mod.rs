//! Entity models
//!
//! Plain data records stored by the library engine. Relationship rules live
//! with the services that mutate them; the models only carry the invariants
//! that can be checked on a single record (ISBN shape, loan state machine).

pub mod account;
pub mod author;
pub mod book;
pub mod loan;
pub mod patron;

pub use account::Account;
pub use author::Author;
pub use book::{validate_isbn, Book};
pub use loan::{Loan, LoanStatus};
pub use patron::Patron;
