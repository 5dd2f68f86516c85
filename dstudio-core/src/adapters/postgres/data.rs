//! Paginated table reads and raw query passthrough.

use crate::Result;
use crate::adapters::helpers::{first_row_keys, pg_row_to_json, qualified_name};
use crate::error::StudioError;
use crate::models::{Pagination, QueryResult, TableData};
use serde_json::Value as JsonValue;
use sqlx::{Executor, PgConnection, postgres::PgRow};

/// One page of `schema.table` as JSON objects plus the exact row count.
///
/// Table names cannot be bound as parameters, so both identifiers are
/// quoted with [`qualified_name`]. The page is read over the simple query
/// protocol, the same path as [`run_query`], so both return identically
/// shaped rows (`NUMERIC` as an exact string, arrays as Postgres text).
/// `LIMIT` and `OFFSET` are integers from [`Pagination`].
pub(crate) async fn fetch_table_page(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
    pagination: Pagination,
) -> Result<TableData> {
    let relation = qualified_name(schema, table);

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", relation))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            StudioError::query_failed(format!("Failed to count rows in {}.{}", schema, table), e)
        })?;

    let page_sql = format!(
        "SELECT * FROM {} LIMIT {} OFFSET {}",
        relation,
        pagination.limit(),
        pagination.offset()
    );
    let pg_rows = Executor::fetch_all(&mut *conn, page_sql.as_str())
        .await
        .map_err(|e| {
            StudioError::query_failed(format!("Failed to read rows from {}.{}", schema, table), e)
        })?;
    let rows = rows_to_json(&pg_rows)?;

    tracing::debug!(
        "Read {} rows from {}.{} (page {}, size {}, total {})",
        rows.len(),
        schema,
        table,
        pagination.page,
        pagination.page_size,
        total
    );

    let columns = first_row_keys(&rows);
    Ok(TableData {
        rows,
        total_count: u64::try_from(total).unwrap_or_default(),
        columns,
    })
}

/// Runs `sql` over the simple query protocol, exactly as given.
///
/// Multi-statement input is accepted; rows from every statement are
/// returned in order. `fields` are the first row's keys, so a statement
/// that returns no rows reports no fields.
pub(crate) async fn run_query(conn: &mut PgConnection, sql: &str) -> Result<QueryResult> {
    let pg_rows = Executor::fetch_all(&mut *conn, sql)
        .await
        .map_err(|e| StudioError::query_failed("Query execution failed", e))?;
    let rows = rows_to_json(&pg_rows)?;

    let fields = first_row_keys(&rows);
    Ok(QueryResult {
        row_count: u64::try_from(rows.len()).unwrap_or(u64::MAX),
        rows,
        fields,
    })
}

fn rows_to_json(pg_rows: &[PgRow]) -> Result<Vec<JsonValue>> {
    pg_rows
        .iter()
        .map(|row| pg_row_to_json(row).map(JsonValue::Object))
        .collect()
}
