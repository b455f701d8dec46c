//! Library domain services for Folio
//!
//! Stateless facades over an `Arc<Database>`:
//! - Catalog: authors and books, ISBN uniqueness, stock counters
//! - Patrons: student profiles, cascade delete, deactivation
//! - AccountStore: the in-process identity provider
//! - Registration: account + patron creation in one unit of work
//! - Ledger: borrow/return state machine and overdue computation
//! - AdminOrOwner: capability checks for the boundary layer
//!
//! Every mutating operation runs in `Database::transaction_with_retry`, so
//! services can be cloned and shared across threads freely. Each service
//! also exposes `*_in` variants taking a `&mut TransactionContext` for
//! composing several operations in one unit of work.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod extensions;
pub mod identity;
pub mod ledger;
pub mod patrons;
pub mod policy;
pub mod registration;

pub use catalog::{AuthorInput, BookInput, Catalog};
pub use extensions::RecordTxnExt;
pub use identity::{AccountStore, IdentityProvider, NewAccount};
pub use ledger::{Ledger, LoanView};
pub use patrons::{CascadeReport, PatronInput, Patrons};
pub use policy::{AccessPolicy, Action, Actor, AdminOrOwner, Decision, Resource};
pub use registration::{Registration, RegistrationRequest};
