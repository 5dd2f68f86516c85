//! PostgreSQL connection-string resolution and per-call connections.
//!
//! # Security Features
//! - Validates the connection string scheme before anything is opened
//! - Bounds every connect attempt with a timeout
//! - Requires TLS when the config's `ssl` flag is set
//! - Redacts the connection string in every log line and timeout message

use super::PostgresAdapter;
use crate::adapters::{AdapterOptions, ConnectionConfig, redact_database_url};
use crate::{Result, error::StudioError};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{Connection, PgConnection};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Port used when the config does not name one.
pub const DEFAULT_PORT: u16 = 5432;

/// Shown in `pg_stat_activity.application_name`.
const APPLICATION_NAME: &str = "dstudio";

impl PostgresAdapter {
    /// Creates an adapter with default timeouts. No connection is opened.
    ///
    /// # Errors
    /// Returns a configuration error if the config has neither a URI nor a
    /// host, or if the resolved string is not a `postgres://` URL.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        Self::with_options(config, AdapterOptions::default())
    }

    /// Creates an adapter with explicit timeouts. No connection is opened.
    ///
    /// # Errors
    /// Same as [`new`](Self::new), plus invalid options.
    pub fn with_options(config: &ConnectionConfig, options: AdapterOptions) -> Result<Self> {
        config.validate()?;
        options.validate()?;

        let connection_string = Self::connection_string_for(config)?;
        Self::validate_connection_string(&connection_string)?;

        tracing::debug!(
            "Resolved PostgreSQL connection string: {}",
            redact_database_url(&connection_string)
        );

        Ok(Self {
            connection_string,
            require_ssl: config.ssl,
            options,
        })
    }

    /// Resolves the connection string for `config`.
    ///
    /// A supplied URI is returned unchanged. Otherwise the URI is assembled
    /// from host, port (default 5432), database and credentials, with the
    /// credentials percent-encoded and `sslmode=require` appended when
    /// `config.ssl` is set.
    ///
    /// # Errors
    /// Returns a configuration error if no URI and no host are given.
    pub fn connection_string_for(config: &ConnectionConfig) -> Result<String> {
        if let Some(uri) = config.connection_uri() {
            return Ok(uri.to_string());
        }

        let host = config
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                StudioError::configuration("either a connection string or a host is required")
            })?;

        // Bare IPv6 literals need brackets to be a valid authority.
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let port = config.port.unwrap_or(DEFAULT_PORT);

        let mut url = Url::parse(&format!("postgresql://{}:{}", host, port)).map_err(|e| {
            StudioError::configuration(format!("Invalid PostgreSQL host '{}': {}", host, e))
        })?;

        if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(username).map_err(|()| {
                StudioError::configuration("Username cannot be set on this connection URL")
            })?;
        }
        if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password)).map_err(|()| {
                StudioError::configuration("Password cannot be set on this connection URL")
            })?;
        }
        if let Some(database) = config.database.as_deref().filter(|d| !d.is_empty()) {
            url.path_segments_mut()
                .map_err(|()| {
                    StudioError::configuration("Database cannot be set on this connection URL")
                })?
                .push(database);
        }
        if config.ssl {
            url.set_query(Some("sslmode=require"));
        }

        Ok(url.to_string())
    }

    /// Validates connection string format.
    ///
    /// # Errors
    /// Returns error if the string is not a URL or uses another scheme
    pub fn validate_connection_string(connection_string: &str) -> Result<()> {
        let url = Url::parse(connection_string).map_err(|e| {
            StudioError::configuration(format!(
                "Invalid PostgreSQL connection string format: {}",
                e
            ))
        })?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(StudioError::configuration(
                "Connection string must use postgres:// or postgresql:// scheme",
            ));
        }

        Ok(())
    }

    /// Driver options for the resolved connection string.
    pub(crate) fn connect_options(&self) -> Result<PgConnectOptions> {
        let options = PgConnectOptions::from_str(&self.connection_string)
            .map_err(|e| {
                StudioError::configuration(format!(
                    "Invalid PostgreSQL connection string {}: {}",
                    redact_database_url(&self.connection_string),
                    e
                ))
            })?
            .application_name(APPLICATION_NAME);

        Ok(if self.require_ssl {
            options.ssl_mode(PgSslMode::Require)
        } else {
            options
        })
    }

    /// Opens a dedicated connection for one call.
    ///
    /// The caller owns the connection and must hand it back through
    /// [`release`](Self::release) on every path.
    pub(crate) async fn connect(&self, timeout: Duration) -> Result<PgConnection> {
        let options = self.connect_options()?;

        match tokio::time::timeout(timeout, PgConnection::connect_with(&options)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                tracing::debug!(
                    "Connection to {} failed: {}",
                    redact_database_url(&self.connection_string),
                    e
                );
                Err(StudioError::connection_failed(e))
            }
            Err(_) => Err(StudioError::connection_timeout(
                redact_database_url(&self.connection_string),
                timeout,
            )),
        }
    }

    /// Closes a per-call connection. Close errors are logged, not returned.
    pub(crate) async fn release(conn: PgConnection) {
        if let Err(e) = conn.close().await {
            tracing::debug!("Error closing PostgreSQL connection: {}", e);
        }
    }
}
