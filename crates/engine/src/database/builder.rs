//! Database builder for fluent configuration

use std::path::PathBuf;
use std::sync::Arc;

use folio_core::LibraryResult;

use super::{Database, LibraryConfig};
use crate::clock::{Clock, SystemClock};

/// Builder for [`Database`]
///
/// ```ignore
/// use folio_engine::{Database, ManualClock};
///
/// // Config from folio.toml in a directory
/// let db = Database::open("/srv/library")?;
///
/// // Explicit config and a test clock
/// let db = Database::builder()
///     .config(LibraryConfig { borrow_period_days: 7, ..Default::default() })
///     .clock(Arc::new(ManualClock::new(start)))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    config: LibraryConfig,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
}

impl DatabaseBuilder {
    /// Defaults: 14-day period, system clock, no data directory
    pub fn new() -> Self {
        Self {
            config: LibraryConfig::default(),
            clock: Arc::new(SystemClock),
            path: None,
        }
    }

    /// Use this configuration
    pub fn config(mut self, config: LibraryConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this clock for due dates and overdue checks
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record the data directory the configuration came from
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Validate the configuration and create the database
    pub fn build(self) -> LibraryResult<Arc<Database>> {
        self.config.validate()?;
        Ok(Arc::new(Database::from_parts(
            self.config,
            self.clock,
            self.path,
        )))
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
