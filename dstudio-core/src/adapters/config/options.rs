//! Per-adapter connection timing.
//!
//! Every adapter call opens its own connection, so these are the only knobs
//! that shape a call's cost: how long to wait for the server to accept a
//! login, and how long a liveness probe may take.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts applied when an adapter opens a connection.
///
/// # Example
/// ```rust
/// use dstudio_core::adapters::AdapterOptions;
/// use std::time::Duration;
///
/// let options = AdapterOptions::default().with_connect_timeout(Duration::from_secs(10));
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterOptions {
    /// Connect timeout for introspection, data and query calls
    pub connect_timeout: Duration,
    /// Connect timeout for `test_connection`
    pub test_connect_timeout: Duration,
}

impl AdapterOptions {
    /// Default connect timeout for ordinary calls.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default connect timeout for liveness checks.
    pub const DEFAULT_TEST_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Builder method to set the connect timeout.
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the liveness-check timeout.
    pub const fn with_test_connect_timeout(mut self, timeout: Duration) -> Self {
        self.test_connect_timeout = timeout;
        self
    }

    /// Validates timing parameters.
    ///
    /// # Errors
    /// Returns error if either timeout is zero
    pub fn validate(&self) -> crate::Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(crate::error::StudioError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }
        if self.test_connect_timeout.is_zero() {
            return Err(crate::error::StudioError::configuration(
                "test_connect_timeout must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            test_connect_timeout: Self::DEFAULT_TEST_CONNECT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AdapterOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert_eq!(options.test_connect_timeout, Duration::from_secs(5));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let options = AdapterOptions::default().with_connect_timeout(Duration::ZERO);
        assert!(options.validate().is_err());

        let options = AdapterOptions::default().with_test_connect_timeout(Duration::ZERO);
        assert!(options.validate().is_err());
    }
}
