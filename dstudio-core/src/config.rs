//! Process-wide configuration.
//!
//! Built once at startup, validated once, then passed by reference into the
//! action layer. Nothing below re-reads the environment per call.

use crate::adapters::AdapterOptions;
use crate::error::StudioError;
use crate::security::EncryptionKey;
use std::time::Duration;

/// Environment variable overriding the connect timeout, in seconds.
pub const CONNECT_TIMEOUT_ENV: &str = "DSTUDIO_CONNECT_TIMEOUT";
/// Environment variable overriding the table fan-out concurrency.
pub const MAX_CONCURRENCY_ENV: &str = "DSTUDIO_MAX_CONCURRENCY";

/// Upper bound on concurrent per-table fetches.
pub const MAX_CONCURRENCY_LIMIT: usize = 64;

/// Configuration for the action layer.
///
/// # Example
/// ```rust
/// use dstudio_core::config::StudioConfig;
/// use dstudio_core::security::EncryptionKey;
/// use std::time::Duration;
///
/// let config = StudioConfig::new(EncryptionKey::generate())
///     .with_connect_timeout(Duration::from_secs(10))
///     .with_max_concurrent_table_fetches(4);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// Key protecting stored connection strings
    pub encryption_key: EncryptionKey,
    /// Timeout for connections opened by metadata and data operations
    pub connect_timeout: Duration,
    /// Timeout for connection tests
    pub test_connect_timeout: Duration,
    /// Concurrent `getTableSchema` calls when saving a connection
    pub max_concurrent_table_fetches: usize,
    /// Lifetime of cached table descriptors
    pub table_cache_ttl: Duration,
}

impl StudioConfig {
    /// Defaults around an explicit key.
    pub fn new(encryption_key: EncryptionKey) -> Self {
        let adapter_defaults = AdapterOptions::default();
        Self {
            encryption_key,
            connect_timeout: adapter_defaults.connect_timeout,
            test_connect_timeout: adapter_defaults.test_connect_timeout,
            max_concurrent_table_fetches: 8,
            table_cache_ttl: Duration::from_secs(300),
        }
    }

    /// Reads configuration from the process environment.
    ///
    /// `ENCRYPTION_KEY` is required. `DSTUDIO_CONNECT_TIMEOUT` (seconds) and
    /// `DSTUDIO_MAX_CONCURRENCY` override their defaults when set.
    ///
    /// # Errors
    /// Returns a fatal configuration error when the key is missing or
    /// malformed, or an override does not parse or validate.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::new(EncryptionKey::from_env()?);

        if let Some(secs) = read_env_number::<u64>(CONNECT_TIMEOUT_ENV)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = read_env_number::<usize>(MAX_CONCURRENCY_ENV)? {
            config.max_concurrent_table_fetches = max;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if a timeout is zero or the concurrency is out of range
    pub fn validate(&self) -> crate::Result<()> {
        self.adapter_options().validate()?;

        if self.max_concurrent_table_fetches == 0 {
            return Err(StudioError::configuration(
                "max_concurrent_table_fetches must be greater than 0",
            ));
        }
        if self.max_concurrent_table_fetches > MAX_CONCURRENCY_LIMIT {
            return Err(StudioError::configuration(format!(
                "max_concurrent_table_fetches should not exceed {}",
                MAX_CONCURRENCY_LIMIT
            )));
        }
        if self.table_cache_ttl.is_zero() {
            return Err(StudioError::configuration(
                "table_cache_ttl must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Timeouts handed to every adapter the action layer creates.
    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions::default()
            .with_connect_timeout(self.connect_timeout)
            .with_test_connect_timeout(self.test_connect_timeout)
    }

    /// Builder method to set the connect timeout.
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the connection-test timeout.
    pub const fn with_test_connect_timeout(mut self, timeout: Duration) -> Self {
        self.test_connect_timeout = timeout;
        self
    }

    /// Builder method to set the table fan-out concurrency.
    pub const fn with_max_concurrent_table_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_table_fetches = max;
        self
    }

    /// Builder method to set the table cache TTL.
    pub const fn with_table_cache_ttl(mut self, ttl: Duration) -> Self {
        self.table_cache_ttl = ttl;
        self
    }
}

fn read_env_number<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            StudioError::configuration(format!("{} must be a number, got '{}'", name, value))
        }),
        Err(_) => Ok(None),
    }
}
