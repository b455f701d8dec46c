//! Identity accounts
//!
//! The ledger and patron store only need four things from an identity
//! provider, captured by [`IdentityProvider`]. Every method takes the
//! caller's `TransactionContext`, so registration can create the account
//! and the patron profile in one unit of work and a patron delete can
//! remove the account atomically.
//!
//! [`AccountStore`] keeps accounts in the shared store next to the library
//! records. Usernames are unique through a `TypeTag::UsernameIndex` row
//! claimed with a CAS against the version observed at read time.
//!
//! Passwords are stored as bcrypt hashes (`$2b$<cost>$<salt+digest>`) with
//! the work factor taken from `password_hash_cost` in the configuration.

use std::fmt;
use std::sync::Arc;

use folio_concurrency::TransactionContext;
use folio_core::limits::{
    validate_optional, validate_required, MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_USERNAME_LEN,
};
use folio_core::{
    Account, AccountId, Key, LibraryError, LibraryResult, Record, TypeTag, Value,
};
use folio_engine::Database;
use serde::{Deserialize, Serialize};

use crate::extensions::RecordTxnExt;

/// Fields for a new identity account
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Login name: letters, digits and `@.+-_`
    pub username: String,
    /// Contact address, required
    pub email: String,
    /// Given name
    #[serde(default)]
    pub first_name: String,
    /// Family name
    #[serde(default)]
    pub last_name: String,
    /// Plain-text password, hashed before storage
    pub password: String,
    /// Grant staff rights
    #[serde(default)]
    pub is_staff: bool,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("password", &"<redacted>")
            .field("is_staff", &self.is_staff)
            .finish()
    }
}

impl NewAccount {
    /// Account with a username, email and password
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        NewAccount {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Check field rules
    pub fn validate(&self) -> LibraryResult<()> {
        validate_required("username", &self.username, MAX_USERNAME_LEN)?;
        if let Some(c) = self
            .username
            .chars()
            .find(|c| !(c.is_alphanumeric() || "@.+-_".contains(*c)))
        {
            return Err(LibraryError::validation(
                "username",
                format!("'{c}' is not allowed; use letters, digits and @/./+/-/_ only"),
            ));
        }
        validate_required("email", &self.email, MAX_EMAIL_LEN)?;
        if !self.email.contains('@') {
            return Err(LibraryError::validation(
                "email",
                "enter a valid email address",
            ));
        }
        validate_optional("first_name", Some(self.first_name.as_str()), MAX_NAME_LEN)?;
        validate_optional("last_name", Some(self.last_name.as_str()), MAX_NAME_LEN)?;
        if self.password.is_empty() {
            return Err(LibraryError::validation(
                "password",
                "this field may not be blank",
            ));
        }
        Ok(())
    }
}

/// Identity operations the library core depends on
pub trait IdentityProvider: Send + Sync {
    /// Create an account inside `txn`
    ///
    /// Fails with `DuplicateIdentity` if the username is taken.
    fn create_account(
        &self,
        txn: &mut TransactionContext,
        account: &NewAccount,
    ) -> LibraryResult<AccountId>;

    /// Whether a username is taken
    fn account_exists(&self, txn: &mut TransactionContext, username: &str) -> LibraryResult<bool>;

    /// Look an account up
    fn get_account(
        &self,
        txn: &mut TransactionContext,
        id: AccountId,
    ) -> LibraryResult<Option<Account>>;

    /// Delete an account, returning whether it existed
    fn delete_account(&self, txn: &mut TransactionContext, id: AccountId) -> LibraryResult<bool>;
}

/// Accounts stored alongside the library records
#[derive(Clone)]
pub struct AccountStore {
    db: Arc<Database>,
}

impl AccountStore {
    /// Create an account store over `db`
    pub fn new(db: Arc<Database>) -> Self {
        AccountStore { db }
    }

    /// Look an account up by username
    pub fn find_by_username(&self, username: &str) -> LibraryResult<Account> {
        self.db.transaction(|txn| {
            lookup(txn, username)?.ok_or_else(|| LibraryError::not_found(Account::ENTITY, username))
        })
    }

    /// Check a password for an active account
    ///
    /// Unknown usernames and inactive accounts verify as `false`.
    pub fn verify_password(&self, username: &str, password: &str) -> LibraryResult<bool> {
        let account = self.db.transaction(|txn| lookup(txn, username))?;
        match account.filter(|a| a.is_active) {
            Some(account) => check_password(&account.password_hash, password),
            None => Ok(false),
        }
    }
}

fn lookup(txn: &mut TransactionContext, username: &str) -> LibraryResult<Option<Account>> {
    match txn.get_ref(&Key::username(username))? {
        Some(id) => txn.fetch::<Account>(AccountId::new(id)),
        None => Ok(None),
    }
}

fn hashing_error(e: bcrypt::BcryptError) -> LibraryError {
    LibraryError::internal(format!("password hashing failed: {e}"))
}

/// Hash a password with a fresh salt at the given bcrypt cost
pub fn hash_password(password: &str, cost: u32) -> LibraryResult<String> {
    bcrypt::hash(password, cost).map_err(hashing_error)
}

/// Check a password against a stored bcrypt hash
///
/// A stored value that is not a bcrypt hash is an `Internal` error.
pub fn check_password(stored: &str, password: &str) -> LibraryResult<bool> {
    bcrypt::verify(password, stored).map_err(hashing_error)
}

impl IdentityProvider for AccountStore {
    fn create_account(
        &self,
        txn: &mut TransactionContext,
        account: &NewAccount,
    ) -> LibraryResult<AccountId> {
        account.validate()?;
        let key = Key::username(&account.username);
        if txn.get_ref(&key)?.is_some() {
            return Err(LibraryError::DuplicateIdentity {
                username: account.username.clone(),
            });
        }
        // A username deleted earlier in this unit of work was read by
        // delete_account, so its live version is the one to swap against.
        let observed = txn.get_read_version(&key).unwrap_or(0);
        let password_hash = hash_password(&account.password, self.db.config().password_hash_cost)?;

        let id = AccountId::new(self.db.next_id(TypeTag::Account));
        let record = Account {
            id,
            username: account.username.clone(),
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            password_hash,
            is_staff: account.is_staff,
            is_active: true,
            date_joined: self.db.now(),
        };
        txn.cas(key, observed, Value::Ref(id.as_u64()))?;
        txn.put_record(record)?;
        Ok(id)
    }

    fn account_exists(&self, txn: &mut TransactionContext, username: &str) -> LibraryResult<bool> {
        Ok(txn.get_ref(&Key::username(username))?.is_some())
    }

    fn get_account(
        &self,
        txn: &mut TransactionContext,
        id: AccountId,
    ) -> LibraryResult<Option<Account>> {
        txn.fetch::<Account>(id)
    }

    fn delete_account(&self, txn: &mut TransactionContext, id: AccountId) -> LibraryResult<bool> {
        let Some(account) = txn.fetch::<Account>(id)? else {
            return Ok(false);
        };
        let key = Key::username(&account.username);
        // Recorded so a re-registration of the name in the same unit of
        // work can swap against this version.
        txn.get(&key)?;
        txn.delete(key)?;
        txn.delete_record::<Account>(id)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use folio_engine::{LibraryConfig, MIN_PASSWORD_HASH_COST};

    fn store() -> (Arc<Database>, AccountStore) {
        let db = Database::with_config(LibraryConfig {
            password_hash_cost: MIN_PASSWORD_HASH_COST,
            ..Default::default()
        })
        .unwrap();
        (db.clone(), AccountStore::new(db))
    }

    #[test]
    fn test_hash_is_bcrypt() {
        let hash = hash_password("hunter22", MIN_PASSWORD_HASH_COST).unwrap();
        assert!(hash.starts_with("$2b$04$"));
        assert!(check_password(&hash, "hunter22").unwrap());
        assert!(!check_password(&hash, "hunter23").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_internal() {
        assert!(matches!(
            check_password("plain", "plain"),
            Err(LibraryError::Internal { .. })
        ));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(
            hash_password("same", MIN_PASSWORD_HASH_COST).unwrap(),
            hash_password("same", MIN_PASSWORD_HASH_COST).unwrap()
        );
    }

    #[test]
    fn test_stored_hash_uses_configured_cost() {
        let (db, store) = store();
        let new = NewAccount::new("ada", "ada@example.org", "s3cret");
        db.transaction(|txn| store.create_account(txn, &new)).unwrap();
        let account = store.find_by_username("ada").unwrap();
        assert!(account.password_hash.starts_with("$2b$04$"));
    }

    #[test]
    fn test_delete_and_recreate_username_in_one_unit_of_work() {
        let (db, store) = store();
        let new = NewAccount::new("ada", "ada@example.org", "pw");
        let old = db.transaction(|txn| store.create_account(txn, &new)).unwrap();

        let replacement = db
            .transaction_with_retry(|txn| {
                store.delete_account(txn, old)?;
                store.create_account(txn, &new)
            })
            .unwrap();

        assert_ne!(replacement, old);
        assert_eq!(store.find_by_username("ada").unwrap().id, replacement);
        assert_eq!(db.metrics().total_retries, 0);
    }

    #[test]
    fn test_create_and_verify() {
        let (db, store) = store();
        let new = NewAccount::new("ada", "ada@example.org", "s3cret");
        let id = db
            .transaction(|txn| store.create_account(txn, &new))
            .unwrap();
        let account = store.find_by_username("ada").unwrap();
        assert_eq!(account.id, id);
        assert!(account.is_active);
        assert!(!account.password_hash.contains("s3cret"));
        assert!(store.verify_password("ada", "s3cret").unwrap());
        assert!(!store.verify_password("ada", "wrong").unwrap());
        assert!(!store.verify_password("nobody", "s3cret").unwrap());
    }

    #[test]
    fn test_duplicate_username() {
        let (db, store) = store();
        let new = NewAccount::new("ada", "ada@example.org", "pw");
        db.transaction(|txn| store.create_account(txn, &new)).unwrap();
        let err = db
            .transaction(|txn| store.create_account(txn, &new))
            .unwrap_err();
        assert_eq!(
            err,
            LibraryError::DuplicateIdentity {
                username: "ada".to_string()
            }
        );
    }

    #[test]
    fn test_username_reusable_after_delete() {
        let (db, store) = store();
        let new = NewAccount::new("ada", "ada@example.org", "pw");
        let id = db.transaction(|txn| store.create_account(txn, &new)).unwrap();
        assert!(db.transaction(|txn| store.delete_account(txn, id)).unwrap());
        assert!(!db.transaction(|txn| store.delete_account(txn, id)).unwrap());

        let again = db.transaction(|txn| store.create_account(txn, &new)).unwrap();
        assert_ne!(again, id);
        assert!(db
            .transaction(|txn| store.account_exists(txn, "ada"))
            .unwrap());
    }

    #[test]
    fn test_validation() {
        let bad_username = NewAccount::new("ada lovelace", "ada@example.org", "pw");
        assert!(matches!(
            bad_username.validate(),
            Err(LibraryError::ValidationError {
                field: "username",
                ..
            })
        ));
        let bad_email = NewAccount::new("ada", "ada.example.org", "pw");
        assert!(matches!(
            bad_email.validate(),
            Err(LibraryError::ValidationError { field: "email", .. })
        ));
        let no_password = NewAccount::new("ada", "ada@example.org", "");
        assert!(matches!(
            no_password.validate(),
            Err(LibraryError::ValidationError {
                field: "password",
                ..
            })
        ));
        assert!(NewAccount::new("ada.l+lib@x", "a@b", "pw").validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let new = NewAccount::new("ada", "ada@example.org", "s3cret");
        assert!(!format!("{new:?}").contains("s3cret"));
    }
}
