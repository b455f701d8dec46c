//! Capability checks for the boundary layer
//!
//! The ledger and stores never consult the policy themselves. A REST or CLI
//! front end builds an [`Actor`] from its session, asks the policy about
//! the [`Action`] and [`Resource`] it is about to touch, and only then calls
//! the service.
//!
//! [`AdminOrOwner`] is the default policy:
//!
//! | Resource | Rule |
//! |----------|------|
//! | Catalog | anyone reads, staff writes |
//! | Registration | anyone |
//! | Patron profile | staff or the owning patron; borrowing only as yourself |
//! | Loan | staff or the borrowing patron; returning only as yourself |
//! | All loans | staff lists every loan, patrons read their own |

use folio_core::{Account, AccountId, LibraryError, LibraryResult, Patron, PatronId};
use serde::{Deserialize, Serialize};

/// Who is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Actor {
    /// No authenticated session
    #[default]
    Anonymous,
    /// Authenticated account, with its patron profile if it has one
    User {
        /// Authenticated account
        account_id: AccountId,
        /// Profile owned by the account
        patron_id: Option<PatronId>,
        /// Staff flag of the account
        is_staff: bool,
    },
}

impl Actor {
    /// Actor for an account and its optional profile
    pub fn from_account(account: &Account, patron: Option<&Patron>) -> Self {
        Actor::User {
            account_id: account.id,
            patron_id: patron.map(|p| p.id),
            is_staff: account.is_staff,
        }
    }

    /// Staff actor without a patron profile
    pub fn staff(account_id: AccountId) -> Self {
        Actor::User {
            account_id,
            patron_id: None,
            is_staff: true,
        }
    }

    /// Non-staff actor owning a patron profile
    pub fn patron(account_id: AccountId, patron_id: PatronId) -> Self {
        Actor::User {
            account_id,
            patron_id: Some(patron_id),
            is_staff: false,
        }
    }

    /// Whether the actor is authenticated
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Actor::User { .. })
    }

    /// Whether the actor is staff
    pub fn is_staff(&self) -> bool {
        matches!(self, Actor::User { is_staff: true, .. })
    }

    /// Whether the actor owns this patron profile
    pub fn owns(&self, patron_id: PatronId) -> bool {
        matches!(self, Actor::User { patron_id: Some(p), .. } if *p == patron_id)
    }
}

/// What the actor wants to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Read or list
    Read,
    /// Create
    Create,
    /// Update
    Update,
    /// Delete
    Delete,
    /// Borrow a book
    Borrow,
    /// Return a loan
    Return,
    /// List every loan in the system
    ListAll,
}

impl Action {
    fn is_read(self) -> bool {
        matches!(self, Action::Read)
    }
}

/// What the action touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resource {
    /// Authors and books
    Catalog,
    /// Self-service sign-up
    Registration,
    /// One patron profile
    Patron(PatronId),
    /// One loan, owned by `owner`
    Loan {
        /// Borrowing patron
        owner: PatronId,
    },
    /// The loan collection
    Loans,
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Go ahead
    Allow,
    /// Refused, with the reason shown to the caller
    Deny(String),
}

impl Decision {
    /// Whether access was granted
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// `Forbidden` on deny
    pub fn into_result(self) -> LibraryResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(LibraryError::Forbidden { reason }),
        }
    }

    fn deny(reason: &str) -> Self {
        Decision::Deny(reason.to_string())
    }
}

/// A capability check
pub trait AccessPolicy: Send + Sync {
    /// Decide whether `actor` may perform `action` on `resource`
    fn check(&self, actor: &Actor, action: Action, resource: &Resource) -> Decision;

    /// [`AccessPolicy::check`] as a `Result`
    fn authorize(&self, actor: &Actor, action: Action, resource: &Resource) -> LibraryResult<()> {
        self.check(actor, action, resource).into_result()
    }
}

/// Staff may do anything but act as a patron; patrons manage their own
/// profile and loans
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminOrOwner;

const AUTH_REQUIRED: &str = "authentication credentials were not provided";
const STAFF_ONLY: &str = "this action requires staff rights";
const NOT_OWNER: &str = "you do not have permission to act on another patron's records";
const NO_PROFILE: &str = "only accounts with a patron profile can borrow or return";

impl AccessPolicy for AdminOrOwner {
    fn check(&self, actor: &Actor, action: Action, resource: &Resource) -> Decision {
        match resource {
            Resource::Registration => match action {
                Action::Create => Decision::Allow,
                _ => Decision::deny(STAFF_ONLY),
            },
            Resource::Catalog if action.is_read() => Decision::Allow,
            _ if !actor.is_authenticated() => Decision::deny(AUTH_REQUIRED),
            Resource::Catalog => staff_only(actor),
            Resource::Patron(id) => match action {
                Action::Borrow => as_self(actor, *id),
                Action::Create | Action::ListAll => staff_only(actor),
                _ => staff_or_owner(actor, *id),
            },
            Resource::Loan { owner } => match action {
                Action::Return => as_self(actor, *owner),
                _ => staff_or_owner(actor, *owner),
            },
            Resource::Loans => match action {
                Action::Read => Decision::Allow,
                _ => staff_only(actor),
            },
        }
    }
}

fn staff_only(actor: &Actor) -> Decision {
    if actor.is_staff() {
        Decision::Allow
    } else {
        Decision::deny(STAFF_ONLY)
    }
}

fn staff_or_owner(actor: &Actor, owner: PatronId) -> Decision {
    if actor.is_staff() || actor.owns(owner) {
        Decision::Allow
    } else {
        Decision::deny(NOT_OWNER)
    }
}

fn as_self(actor: &Actor, owner: PatronId) -> Decision {
    match actor {
        Actor::User {
            patron_id: None, ..
        } => Decision::deny(NO_PROFILE),
        _ if actor.owns(owner) => Decision::Allow,
        _ => Decision::deny(NOT_OWNER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADA: PatronId = PatronId::new(1);
    const BOB: PatronId = PatronId::new(2);

    fn ada() -> Actor {
        Actor::patron(AccountId::new(10), ADA)
    }

    fn staff() -> Actor {
        Actor::staff(AccountId::new(99))
    }

    #[test]
    fn test_catalog_reads_open_writes_staff() {
        let policy = AdminOrOwner;
        assert!(policy
            .check(&Actor::Anonymous, Action::Read, &Resource::Catalog)
            .is_allowed());
        assert!(!policy
            .check(&Actor::Anonymous, Action::Create, &Resource::Catalog)
            .is_allowed());
        assert!(!policy
            .check(&ada(), Action::Update, &Resource::Catalog)
            .is_allowed());
        assert!(policy
            .check(&staff(), Action::Delete, &Resource::Catalog)
            .is_allowed());
    }

    #[test]
    fn test_registration_open() {
        assert!(AdminOrOwner
            .check(&Actor::Anonymous, Action::Create, &Resource::Registration)
            .is_allowed());
    }

    #[test]
    fn test_patron_profile_owner_or_staff() {
        let policy = AdminOrOwner;
        assert!(policy
            .check(&ada(), Action::Update, &Resource::Patron(ADA))
            .is_allowed());
        assert!(!policy
            .check(&ada(), Action::Delete, &Resource::Patron(BOB))
            .is_allowed());
        assert!(policy
            .check(&staff(), Action::Delete, &Resource::Patron(BOB))
            .is_allowed());
        assert!(!policy
            .check(&Actor::Anonymous, Action::Read, &Resource::Patron(ADA))
            .is_allowed());
    }

    #[test]
    fn test_borrow_and_return_only_as_self() {
        let policy = AdminOrOwner;
        assert!(policy
            .check(&ada(), Action::Borrow, &Resource::Patron(ADA))
            .is_allowed());
        assert!(!policy
            .check(&ada(), Action::Borrow, &Resource::Patron(BOB))
            .is_allowed());
        assert!(!policy
            .check(&staff(), Action::Borrow, &Resource::Patron(ADA))
            .is_allowed());
        assert!(policy
            .check(&ada(), Action::Return, &Resource::Loan { owner: ADA })
            .is_allowed());
        assert!(!policy
            .check(&ada(), Action::Return, &Resource::Loan { owner: BOB })
            .is_allowed());
        assert!(policy
            .check(&staff(), Action::Read, &Resource::Loan { owner: BOB })
            .is_allowed());
    }

    #[test]
    fn test_list_all_loans_staff_only() {
        let err = AdminOrOwner
            .authorize(&ada(), Action::ListAll, &Resource::Loans)
            .unwrap_err();
        assert!(matches!(err, LibraryError::Forbidden { .. }));
        assert_eq!(err.http_status(), 403);
        assert!(AdminOrOwner
            .authorize(&staff(), Action::ListAll, &Resource::Loans)
            .is_ok());
        assert!(AdminOrOwner
            .authorize(&ada(), Action::Read, &Resource::Loans)
            .is_ok());
    }
}
