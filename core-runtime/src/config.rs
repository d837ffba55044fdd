//! # Core Configuration Module
//!
//! Configuration for the library catalog core.
//!
//! ## Overview
//!
//! A builder constructs a [`CoreConfig`] holding the storage location, the
//! connection pool sizing, the event bus capacity and the settings of the
//! background uncollected-works maintainer. Validation is fail-fast: `build()`
//! refuses inconsistent values with an actionable message instead of letting
//! the pool or the worker misbehave later.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/folio/catalog.db")
//!     .max_connections(8)
//!     .busy_timeout(Duration::from_secs(10))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! Omitting the database path is an error; tests call
//! [`CoreConfigBuilder::in_memory`] instead.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Where the catalog database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite file on disk
    File(PathBuf),
    /// Shared in-memory database, discarded when the pool closes
    InMemory,
}

/// Core configuration for the library catalog.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Database file or in-memory store
    pub database: DatabaseLocation,

    /// Minimum number of pooled connections
    pub min_connections: u32,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// How long a caller waits for a pooled connection
    pub acquire_timeout: Duration,

    /// How long SQLite waits on a locked database before reporting busy
    pub busy_timeout: Duration,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    /// Background uncollected-works maintenance
    pub maintainer: MaintainerConfig,
}

/// Settings of the background worker that refreshes uncollected-works
/// collections when an authority's involvements change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintainerConfig {
    /// Spawn the worker at startup
    pub enabled: bool,

    /// Total attempts per refresh, including the first
    pub max_attempts: u32,

    /// Delay before the first retry; doubled on each further attempt
    pub initial_backoff: Duration,
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl MaintainerConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }

    /// Validates the maintainer settings
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Maintainer max_attempts must be at least 1".to_string(),
            ));
        }

        if self.max_attempts > 20 {
            return Err(Error::Config(
                "Maintainer max_attempts exceeds maximum of 20".to_string(),
            ));
        }

        if self.initial_backoff > Duration::from_secs(60) {
            return Err(Error::Config(
                "Maintainer initial_backoff exceeds maximum of 60 seconds".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Pool sizing is consistent (1 ≤ min ≤ max ≤ 100)
    /// - Timeouts are non-zero
    /// - Event buffer is non-zero
    /// - Maintainer settings are sane
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.max_connections > 100 {
            return Err(Error::Config(
                "max_connections exceeds maximum of 100".to_string(),
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }

        if self.acquire_timeout.is_zero() {
            return Err(Error::Config(
                "acquire_timeout must be greater than 0".to_string(),
            ));
        }

        if self.busy_timeout.is_zero() {
            return Err(Error::Config(
                "busy_timeout must be greater than 0; concurrent refreshes rely on it".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than 0".to_string(),
            ));
        }

        self.maintainer.validate()
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == DatabaseLocation::InMemory
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database: Option<DatabaseLocation>,
    min_connections: Option<u32>,
    max_connections: Option<u32>,
    acquire_timeout: Option<Duration>,
    busy_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    maintainer: Option<MaintainerConfig>,
}

impl CoreConfigBuilder {
    /// Sets the path to the SQLite database file.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Uses a shared in-memory database.
    pub fn in_memory(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = Some(min);
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn maintainer(mut self, maintainer: MaintainerConfig) -> Self {
        self.maintainer = Some(maintainer);
        self
    }

    /// Shorthand for toggling the background maintainer.
    pub fn enable_maintainer(mut self, enabled: bool) -> Self {
        let maintainer = self.maintainer.unwrap_or_default();
        self.maintainer = Some(maintainer.with_enabled(enabled));
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no database location was given or any value
    /// fails [`CoreConfig::validate`].
    pub fn build(self) -> Result<CoreConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory().".to_string(),
            )
        })?;

        let config = CoreConfig {
            database,
            min_connections: self.min_connections.unwrap_or(1),
            max_connections: self.max_connections.unwrap_or(5),
            acquire_timeout: self.acquire_timeout.unwrap_or(Duration::from_secs(30)),
            busy_timeout: self.busy_timeout.unwrap_or(Duration::from_secs(5)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            maintainer: self.maintainer.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_database_location() {
        let result = CoreConfig::builder().build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database location is required"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder()
            .database_path("/data/catalog.db")
            .build()
            .unwrap();

        assert_eq!(
            config.database,
            DatabaseLocation::File(PathBuf::from("/data/catalog.db"))
        );
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.maintainer, MaintainerConfig::default());
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_builder_in_memory() {
        let config = CoreConfig::builder()
            .in_memory()
            .enable_maintainer(false)
            .build()
            .unwrap();

        assert!(config.is_in_memory());
        assert!(!config.maintainer.enabled);
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let result = CoreConfig::builder().database_path("").build();
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_rejects_inverted_pool_sizing() {
        let result = CoreConfig::builder()
            .in_memory()
            .min_connections(6)
            .max_connections(2)
            .build();

        let message = result.unwrap_err().to_string();
        assert!(message.contains("min_connections (6)"));
        assert!(message.contains("max_connections (2)"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(CoreConfig::builder()
            .in_memory()
            .max_connections(0)
            .build()
            .is_err());
        assert!(CoreConfig::builder()
            .in_memory()
            .busy_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(CoreConfig::builder()
            .in_memory()
            .event_buffer_size(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_validate_maintainer() {
        let result = CoreConfig::builder()
            .in_memory()
            .maintainer(MaintainerConfig::default().with_max_attempts(0))
            .build();
        assert!(result.unwrap_err().to_string().contains("max_attempts"));

        let result = CoreConfig::builder()
            .in_memory()
            .maintainer(MaintainerConfig::default().with_initial_backoff(Duration::from_secs(120)))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let maintainer = MaintainerConfig::default().with_initial_backoff(Duration::from_millis(50));

        assert_eq!(maintainer.backoff_for(1), Duration::from_millis(50));
        assert_eq!(maintainer.backoff_for(2), Duration::from_millis(100));
        assert_eq!(maintainer.backoff_for(4), Duration::from_millis(400));
    }
}
