//! PostgreSQL adapter with per-call connections and catalog introspection.
//!
//! # Module Structure
//! - `connection`: connection-string resolution, connect with timeout, release
//! - `type_mapping`: catalog code interpretation (relkind, referential actions)
//! - `schema_collection`: schema, table, column, constraint and index queries
//! - `data`: paginated table reads and raw query passthrough
//!
//! # Connection Lifecycle
//! Construction only resolves the connection string. Each trait method opens
//! one connection, runs every query it needs on it, and closes it before
//! returning, whether the queries succeeded or not.

mod connection;
mod data;
mod schema_collection;
mod type_mapping;

#[cfg(test)]
mod tests;

use super::{AdapterFeature, AdapterOptions, ConnectionConfig, DatabaseAdapter, redact_database_url};
use crate::{Result, models::*};
use async_trait::async_trait;
use std::time::Instant;

pub use connection::DEFAULT_PORT;
pub use schema_collection::SYSTEM_SCHEMAS;
pub use type_mapping::{classify_relkind, is_auto_increment, map_referential_action};

/// PostgreSQL adapter.
///
/// Holds only the resolved connection string and timeouts, so it is cheap
/// to construct and safe to share across tasks.
pub struct PostgresAdapter {
    connection_string: String,
    require_ssl: bool,
    options: AdapterOptions,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field(
                "connection_string",
                &redact_database_url(&self.connection_string),
            )
            .field("require_ssl", &self.require_ssl)
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::SchemaIntrospection
                | AdapterFeature::PaginatedData
                | AdapterFeature::RawQuery
                | AdapterFeature::MaterializedViews
                | AdapterFeature::Tls
        )
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> Result<String> {
        Self::connection_string_for(config)
    }

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    async fn test_connection(&self) -> ConnectionTest {
        let mut conn = match self.connect(self.options.test_connect_timeout).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::info!(
                    "Connection test to {} failed: {}",
                    redact_database_url(&self.connection_string),
                    e
                );
                return ConnectionTest::failed(e.to_string());
            }
        };

        let probe = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&mut conn)
            .await;
        Self::release(conn).await;

        match probe {
            Ok(_) => ConnectionTest::ok(),
            Err(e) => ConnectionTest::failed(
                crate::error::StudioError::connection_failed(e).to_string(),
            ),
        }
    }

    async fn get_database_metadata(&self) -> Result<DatabaseMetaData> {
        let start = Instant::now();
        let mut conn = self.connect(self.options.connect_timeout).await?;

        let result = async {
            let version = schema_collection::collect_version(&mut conn).await?;
            let schemas = schema_collection::collect_schemas(&mut conn).await?;
            Ok(DatabaseMetaData {
                database_type: DatabaseType::PostgreSQL,
                version,
                schemas,
            })
        }
        .await;
        Self::release(conn).await;

        if let Ok(metadata) = &result {
            tracing::info!(
                "Collected metadata for {} schemas ({} tables) in {:.2}s",
                metadata.schemas.len(),
                metadata.table_count(),
                start.elapsed().as_secs_f64()
            );
        }
        result
    }

    async fn get_schemas(&self) -> Result<Vec<SchemaMetaData>> {
        let mut conn = self.connect(self.options.connect_timeout).await?;
        let result = schema_collection::collect_schemas(&mut conn).await;
        Self::release(conn).await;
        result
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<TableMetaData>> {
        let start = Instant::now();
        let mut conn = self.connect(self.options.connect_timeout).await?;

        let result = async {
            let summaries =
                schema_collection::collect_table_summaries(&mut conn, Some(schema)).await?;
            let mut tables = Vec::with_capacity(summaries.len());
            for (schema_name, summary) in summaries {
                tables.push(
                    schema_collection::collect_table(&mut conn, &schema_name, &summary.name)
                        .await?,
                );
            }
            Ok(tables)
        }
        .await;
        Self::release(conn).await;

        if let Ok(tables) = &result {
            tracing::info!(
                "Collected {} tables from schema '{}' in {:.2}s",
                tables.len(),
                schema,
                start.elapsed().as_secs_f64()
            );
        }
        result
    }

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<TableMetaData> {
        let mut conn = self.connect(self.options.connect_timeout).await?;
        let result = schema_collection::collect_table(&mut conn, schema, table).await;
        Self::release(conn).await;
        result
    }

    async fn get_table_data(
        &self,
        schema: &str,
        table: &str,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<TableData> {
        let pagination = Pagination::new(page, page_size);
        let mut conn = self.connect(self.options.connect_timeout).await?;
        let result = data::fetch_table_page(&mut conn, schema, table, pagination).await;
        Self::release(conn).await;
        result
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let mut conn = self.connect(self.options.connect_timeout).await?;
        let result = data::run_query(&mut conn, sql).await;
        Self::release(conn).await;

        match &result {
            Ok(query) => tracing::info!(
                "Query returned {} rows in {:.2}s",
                query.row_count,
                start.elapsed().as_secs_f64()
            ),
            Err(e) => tracing::warn!("Query failed: {}", e),
        }
        result
    }
}
