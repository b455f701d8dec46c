//! Self-service registration
//!
//! Creates an identity account and its patron profile in one unit of work:
//! either both exist afterwards or neither does.

use std::sync::Arc;

use folio_core::{LibraryError, LibraryResult, Patron};
use folio_engine::Database;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::identity::{IdentityProvider, NewAccount};
use crate::patrons::{PatronInput, Patrons};

/// Account and profile fields submitted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Identity fields
    pub account: NewAccount,
    /// Patron profile fields
    pub patron: PatronInput,
}

/// Account + patron creation
#[derive(Clone)]
pub struct Registration {
    db: Arc<Database>,
    identity: Arc<dyn IdentityProvider>,
    patrons: Patrons,
}

impl Registration {
    /// Create a registration service
    pub fn new(db: Arc<Database>, identity: Arc<dyn IdentityProvider>) -> Self {
        let patrons = Patrons::new(db.clone(), identity.clone());
        Registration {
            db,
            identity,
            patrons,
        }
    }

    /// Check that a password and its confirmation agree
    ///
    /// Called by the boundary before [`Registration::register`]; the
    /// confirmation is never stored.
    pub fn confirm_password(password: &str, confirmation: &str) -> LibraryResult<()> {
        if password.is_empty() {
            return Err(LibraryError::validation(
                "password",
                "this field may not be blank",
            ));
        }
        if password != confirmation {
            return Err(LibraryError::validation(
                "password2",
                "password fields didn't match",
            ));
        }
        Ok(())
    }

    /// Register a new patron with a fresh account
    ///
    /// Domain failures (duplicate username or student id, invalid fields)
    /// are returned as-is. Any other failure is logged and reported as
    /// `CreationFailed`, except a conflict that outlived the retry budget.
    pub fn register(&self, request: RegistrationRequest) -> LibraryResult<Patron> {
        request.account.validate()?;
        request.patron.validate()?;

        let result = self.db.transaction_with_retry(|txn| {
            if self.identity.account_exists(txn, &request.account.username)? {
                return Err(LibraryError::DuplicateIdentity {
                    username: request.account.username.clone(),
                });
            }
            let account_id = self.identity.create_account(txn, &request.account)?;
            self.patrons.create_in(txn, account_id, &request.patron)
        });

        match result {
            Ok(patron) => {
                info!(
                    target: "folio::patrons",
                    patron_id = %patron.id,
                    account_id = %patron.account_id,
                    username = %request.account.username,
                    "Patron registered"
                );
                Ok(patron)
            }
            Err(e) if e.is_domain() || e.is_conflict() => Err(e),
            Err(e) => {
                error!(
                    target: "folio::patrons",
                    username = %request.account.username,
                    error = %e,
                    "Registration failed"
                );
                Err(LibraryError::CreationFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
