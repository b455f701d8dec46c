//! Identity account records

use crate::types::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity account owned by exactly one patron profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Primary key
    pub id: AccountId,
    /// Unique login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Salted password hash, never the password itself
    pub password_hash: String,
    /// Staff accounts administer the catalog and see every loan
    pub is_staff: bool,
    /// Inactive accounts cannot authenticate
    pub is_active: bool,
    /// Creation time
    pub date_joined: DateTime<Utc>,
}
