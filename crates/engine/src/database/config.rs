//! Library configuration via `folio.toml`
//!
//! On first [`Database::open`](super::Database::open) a default `folio.toml`
//! is written to the data directory. To change settings, edit the file and
//! reopen.

use super::transactions::RetryConfig;
use chrono::Duration;
use folio_core::{LibraryError, LibraryResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "folio.toml";

fn default_borrow_period_days() -> u32 {
    14
}

/// Lowest bcrypt cost accepted in `password_hash_cost`.
pub const MIN_PASSWORD_HASH_COST: u32 = 4;
/// Highest bcrypt cost accepted in `password_hash_cost`.
pub const MAX_PASSWORD_HASH_COST: u32 = 31;

fn default_password_hash_cost() -> u32 {
    12
}

/// Library configuration loaded from `folio.toml`.
///
/// # Example
///
/// ```toml
/// borrow_period_days = 14
/// password_hash_cost = 12
///
/// [retry]
/// max_retries = 8
/// base_delay_ms = 1
/// max_delay_ms = 20
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Days between borrow and due date.
    #[serde(default = "default_borrow_period_days")]
    pub borrow_period_days: u32,
    /// bcrypt work factor for new password hashes.
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
    /// Conflict retry policy for mutating operations.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            borrow_period_days: default_borrow_period_days(),
            password_hash_cost: default_password_hash_cost(),
            retry: RetryConfig::default(),
        }
    }
}

impl LibraryConfig {
    /// Borrow period as a duration.
    pub fn borrow_period(&self) -> Duration {
        Duration::days(i64::from(self.borrow_period_days))
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> LibraryResult<()> {
        if self.borrow_period_days == 0 {
            return Err(LibraryError::validation(
                "borrow_period_days",
                "borrow period must be at least one day",
            ));
        }
        if !(MIN_PASSWORD_HASH_COST..=MAX_PASSWORD_HASH_COST).contains(&self.password_hash_cost) {
            return Err(LibraryError::validation(
                "password_hash_cost",
                format!(
                    "cost must be between {MIN_PASSWORD_HASH_COST} and {MAX_PASSWORD_HASH_COST}"
                ),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Folio library configuration
#
# Days between borrowing a book and its due date (default: 14)
borrow_period_days = 14

# bcrypt work factor for stored passwords, 4 to 31 (default: 12).
# Each step doubles the time to hash or verify a password.
password_hash_cost = 12

# Retry policy for units of work that lose a commit-time conflict.
# Delays double from base_delay_ms up to max_delay_ms.
[retry]
max_retries = 8
base_delay_ms = 1
max_delay_ms = 20
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> LibraryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LibraryError::storage(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: LibraryConfig = toml::from_str(&content).map_err(|e| {
            LibraryError::validation(
                "config",
                format!("failed to parse '{}': {}", path.display(), e),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> LibraryResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                LibraryError::storage(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> LibraryResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LibraryError::internal(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content).map_err(|e| {
            LibraryError::storage(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
