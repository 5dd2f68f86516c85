//! Server-side actions behind the studio front end.
//!
//! Every action takes the caller's identity, runs at most one adapter
//! workflow, and folds the outcome into an [`ActionResult`] envelope. An
//! absent identity is answered with `"Unauthorized"` before any adapter is
//! created. Saved connections are addressed by id and only ever visible to
//! the user who saved them.
//!
//! # Security
//! - Connection strings are persisted only as AES-256-GCM ciphertext
//! - A record whose tag fails to verify is reported, never retried
//! - `execute_query` passes SQL through unmodified; callers must be trusted

use crate::Result;
use crate::adapters::{
    AdapterOptions, ConnectionConfig, DatabaseAdapter, create_adapter_with_options,
    redact_database_url,
};
use crate::cache::{ActiveConnection, Session};
use crate::config::StudioConfig;
use crate::error::StudioError;
use crate::models::{
    DatabaseMetaData, DatabaseType, QueryResult, TableData, TableKey, TableMetaData,
};
use crate::security::ConnectionEncryptor;
use crate::store::{ConnectionRecord, ConnectionStore, UserId};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Uniform result envelope returned by every action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    /// Whether the action completed
    pub success: bool,
    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure message, passed through from the failing layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ActionResult<T> {
    /// Successful envelope carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed envelope carrying `error`.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Envelope for a missing caller identity.
    pub fn unauthorized() -> Self {
        Self::err(StudioError::Unauthorized.to_string())
    }

    /// Folds a result into an envelope, using the error's display text.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }

    /// Back to a `Result`; the error side becomes a plain message.
    pub fn into_result(self) -> std::result::Result<Option<T>, String> {
        match self.error {
            Some(error) if !self.success => Err(error),
            _ => Ok(self.data),
        }
    }
}

/// Output of [`StudioActions::save_connection_and_fetch_metadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedConnection {
    /// Id of the stored record
    pub connection_id: Uuid,
    /// Schema tree fetched while saving
    pub metadata: DatabaseMetaData,
    /// One descriptor per table in `metadata`, in schema then table order
    pub table_details: Vec<TableMetaData>,
}

/// A saved connection without its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    /// Record id
    pub id: Uuid,
    /// Display name
    pub connection_name: String,
    /// Engine
    #[serde(rename = "type")]
    pub database_type: DatabaseType,
    /// When the record was saved
    pub created_at: DateTime<Utc>,
}

impl From<&ConnectionRecord> for ConnectionSummary {
    fn from(record: &ConnectionRecord) -> Self {
        Self {
            id: record.id,
            connection_name: record.connection_name.clone(),
            database_type: record.database_type,
            created_at: record.created_at,
        }
    }
}

/// The action layer: encryption, persistence and the browsing session.
pub struct StudioActions {
    encryptor: ConnectionEncryptor,
    store: Arc<dyn ConnectionStore>,
    session: Session,
    options: AdapterOptions,
    max_concurrency: usize,
}

impl std::fmt::Debug for StudioActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudioActions")
            .field("options", &self.options)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl StudioActions {
    /// Builds the action layer from validated configuration.
    ///
    /// # Errors
    /// Returns a configuration error if `config` does not validate.
    pub fn new(config: &StudioConfig, store: Arc<dyn ConnectionStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            encryptor: ConnectionEncryptor::new(config.encryption_key.clone()),
            store,
            session: Session::new(config.table_cache_ttl),
            options: config.adapter_options(),
            max_concurrency: config.max_concurrent_table_fetches,
        })
    }

    /// The browsing session shared by every action.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Checks that `config` reaches a live database.
    pub async fn test_connection_to_database(
        &self,
        user: Option<&UserId>,
        config: &ConnectionConfig,
    ) -> ActionResult<()> {
        if user.is_none() {
            return ActionResult::unauthorized();
        }
        envelope("test connection", self.run_connection_test(config).await)
    }

    /// Tests `config`, introspects the database, fetches every table's
    /// descriptor, then stores the encrypted connection string under `name`.
    ///
    /// Nothing is stored unless every step succeeds.
    pub async fn save_connection_and_fetch_metadata(
        &self,
        user: Option<&UserId>,
        name: &str,
        config: &ConnectionConfig,
    ) -> ActionResult<SavedConnection> {
        let Some(user) = user else {
            return ActionResult::unauthorized();
        };
        envelope(
            "save connection",
            self.save_and_fetch(user, name, config).await,
        )
    }

    /// Decrypts a saved connection, refreshes its metadata and makes it the
    /// active session.
    pub async fn open_connection(
        &self,
        user: Option<&UserId>,
        connection_id: Uuid,
    ) -> ActionResult<DatabaseMetaData> {
        let Some(user) = user else {
            return ActionResult::unauthorized();
        };
        envelope("open connection", self.open(user, connection_id).await)
    }

    /// Table descriptor, served from the session cache when fresh.
    pub async fn get_table_schema(
        &self,
        user: Option<&UserId>,
        connection_id: Uuid,
        schema: &str,
        table: &str,
    ) -> ActionResult<TableMetaData> {
        let Some(user) = user else {
            return ActionResult::unauthorized();
        };
        envelope(
            "get table schema",
            self.table_schema(user, connection_id, schema, table).await,
        )
    }

    /// One page of rows from a table of a saved connection.
    ///
    /// `page` defaults to 1 and `page_size` to 50.
    pub async fn get_table_data(
        &self,
        user: Option<&UserId>,
        connection_id: Uuid,
        schema: &str,
        table: &str,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> ActionResult<TableData> {
        let Some(user) = user else {
            return ActionResult::unauthorized();
        };
        let result = async {
            let adapter = self.adapter_for_record(user, connection_id).await?;
            adapter
                .get_table_data(schema, table, page, page_size)
                .await
        }
        .await;
        envelope("get table data", result)
    }

    /// Runs raw SQL against a saved connection, unmodified.
    pub async fn execute_query(
        &self,
        user: Option<&UserId>,
        connection_id: Uuid,
        sql: &str,
    ) -> ActionResult<QueryResult> {
        let Some(user) = user else {
            return ActionResult::unauthorized();
        };
        let result = async {
            let adapter = self.adapter_for_record(user, connection_id).await?;
            adapter.execute_query(sql).await
        }
        .await;
        envelope("execute query", result)
    }

    /// The caller's saved connections, oldest first, without ciphertext.
    pub async fn list_connections(
        &self,
        user: Option<&UserId>,
    ) -> ActionResult<Vec<ConnectionSummary>> {
        let Some(user) = user else {
            return ActionResult::unauthorized();
        };
        let result = self
            .store
            .list(user)
            .await
            .map(|records| records.iter().map(ConnectionSummary::from).collect());
        envelope("list connections", result)
    }

    /// Deletes a saved connection, ending the session if it was active.
    pub async fn delete_connection(
        &self,
        user: Option<&UserId>,
        connection_id: Uuid,
    ) -> ActionResult<()> {
        let Some(user) = user else {
            return ActionResult::unauthorized();
        };
        let result = async {
            if !self.store.delete(user, connection_id).await? {
                return Err(connection_not_found(connection_id));
            }
            if self.session.is_active(connection_id).await {
                self.session.end().await;
            }
            Ok(())
        }
        .await;
        envelope("delete connection", result)
    }

    fn adapter_for(&self, config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>> {
        create_adapter_with_options(config, self.options)
    }

    async fn run_connection_test(&self, config: &ConnectionConfig) -> Result<()> {
        let adapter = self.adapter_for(config)?;
        ensure_reachable(adapter.as_ref()).await
    }

    async fn save_and_fetch(
        &self,
        user: &UserId,
        name: &str,
        config: &ConnectionConfig,
    ) -> Result<SavedConnection> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudioError::configuration("connection name is required"));
        }

        let start = Instant::now();
        let adapter = self.adapter_for(config)?;

        ensure_reachable(adapter.as_ref()).await?;

        let metadata = adapter.get_database_metadata().await?;
        let table_details = self
            .fetch_table_details(adapter.as_ref(), metadata.table_keys().collect())
            .await?;

        let encrypted = self.encryptor.encrypt(adapter.connection_string())?;
        let record = ConnectionRecord::new(user.clone(), name, config.database_type, encrypted);
        let connection_id = record.id;
        self.store.insert(record).await?;

        self.session
            .start(
                ActiveConnection {
                    connection_id,
                    connection_name: name.to_string(),
                },
                metadata.clone(),
            )
            .await;
        self.session
            .tables()
            .extend(table_details.iter().cloned())
            .await;

        tracing::info!(
            "Saved connection '{}' to {} with {} tables in {:.2}s",
            name,
            redact_database_url(adapter.connection_string()),
            table_details.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(SavedConnection {
            connection_id,
            metadata,
            table_details,
        })
    }

    /// Fetches descriptors for `keys` with bounded concurrency, keeping
    /// input order. The first failure aborts the batch.
    async fn fetch_table_details(
        &self,
        adapter: &dyn DatabaseAdapter,
        keys: Vec<TableKey>,
    ) -> Result<Vec<TableMetaData>> {
        tracing::debug!(
            "Fetching {} table descriptors with concurrency {}",
            keys.len(),
            self.max_concurrency
        );

        stream::iter(keys)
            .map(|key| async move { adapter.get_table_schema(&key.schema, &key.table).await })
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    async fn open(&self, user: &UserId, connection_id: Uuid) -> Result<DatabaseMetaData> {
        let record = self.record(user, connection_id).await?;
        let adapter = self.adapter_from_record(&record)?;
        let metadata = adapter.get_database_metadata().await?;

        self.session
            .start(
                ActiveConnection {
                    connection_id,
                    connection_name: record.connection_name.clone(),
                },
                metadata.clone(),
            )
            .await;

        Ok(metadata)
    }

    async fn table_schema(
        &self,
        user: &UserId,
        connection_id: Uuid,
        schema: &str,
        table: &str,
    ) -> Result<TableMetaData> {
        let key = TableKey::new(schema, table);

        // The cache belongs to the active connection, so the record is
        // still checked for ownership before serving from it.
        let record = self.record(user, connection_id).await?;
        let active = self.session.is_active(connection_id).await;
        if active && let Some(cached) = self.session.tables().get(&key).await {
            tracing::debug!("Table cache hit for {}", key);
            return Ok(cached);
        }

        let adapter = self.adapter_from_record(&record)?;
        let table = adapter.get_table_schema(schema, table).await?;
        if active {
            self.session.tables().insert(table.clone()).await;
        }
        Ok(table)
    }

    async fn record(&self, user: &UserId, connection_id: Uuid) -> Result<ConnectionRecord> {
        self.store
            .get(user, connection_id)
            .await?
            .ok_or_else(|| connection_not_found(connection_id))
    }

    async fn adapter_for_record(
        &self,
        user: &UserId,
        connection_id: Uuid,
    ) -> Result<Box<dyn DatabaseAdapter>> {
        let record = self.record(user, connection_id).await?;
        self.adapter_from_record(&record)
    }

    fn adapter_from_record(&self, record: &ConnectionRecord) -> Result<Box<dyn DatabaseAdapter>> {
        let connection_url = Zeroizing::new(
            self.encryptor
                .decrypt(&record.encrypted_data())
                .inspect_err(|e| {
                    tracing::warn!(
                        "Stored connection '{}' could not be decrypted: {}",
                        record.connection_name,
                        e
                    );
                })?,
        );
        let config = ConnectionConfig::from_url(record.database_type, connection_url.as_str());
        self.adapter_for(&config)
    }
}

/// Turns a failed liveness probe into a connection error.
async fn ensure_reachable(adapter: &dyn DatabaseAdapter) -> Result<()> {
    let test = adapter.test_connection().await;
    if test.success {
        return Ok(());
    }
    Err(StudioError::Connection {
        context: "Connection test failed".to_string(),
        source: test
            .error
            .unwrap_or_else(|| "unknown error".to_string())
            .into(),
    })
}

fn connection_not_found(connection_id: Uuid) -> StudioError {
    StudioError::not_found(format!("Connection '{}'", connection_id))
}

fn envelope<T>(action: &str, result: Result<T>) -> ActionResult<T> {
    if let Err(e) = &result {
        tracing::warn!("Action '{}' failed: {}", action, e);
    }
    ActionResult::from_result(result)
}
