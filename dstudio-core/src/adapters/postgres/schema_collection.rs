//! PostgreSQL catalog introspection.
//!
//! Every function here runs on a connection borrowed from the calling
//! adapter method, so a composite call (`get_tables`, full metadata) issues
//! all of its catalog queries over one connection.

use super::type_mapping::{
    classify_relkind, is_auto_increment, map_referential_action, non_negative_u32,
    non_negative_u64,
};
use crate::Result;
use crate::adapters::helpers::RowExt;
use crate::error::StudioError;
use crate::models::{
    CheckConstraintMetaData, ColumnMetaData, ForeignKeyMetaData, IndexedMetaData, SchemaMetaData,
    TableMetaData, TableSummary, UniqueConstraintMetaData,
};
use sqlx::PgConnection;

/// Schemas hidden from every listing.
pub const SYSTEM_SCHEMAS: [&str; 3] = ["pg_catalog", "information_schema", "pg_toast"];

/// Server version string from `SELECT version()`.
pub(crate) async fn collect_version(conn: &mut PgConnection) -> Result<String> {
    sqlx::query_scalar::<_, String>("SELECT version()")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| StudioError::collection_failed("Failed to read server version", e))
}

/// Non-system schemas in name order, each with its table summaries.
pub(crate) async fn collect_schemas(conn: &mut PgConnection) -> Result<Vec<SchemaMetaData>> {
    let schema_names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT schema_name::text
        FROM information_schema.schemata
        WHERE schema_name <> ALL($1)
          AND schema_name NOT LIKE 'pg\_temp\_%'
          AND schema_name NOT LIKE 'pg\_toast\_temp\_%'
        ORDER BY schema_name
        "#,
    )
    .bind(&SYSTEM_SCHEMAS[..])
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StudioError::collection_failed("Failed to enumerate schemas", e))?;

    tracing::debug!("Found {} non-system schemas", schema_names.len());

    let summaries = collect_table_summaries(conn, None).await?;
    Ok(group_summaries(schema_names, summaries))
}

/// Attaches summaries to their schema. Both inputs are name-ordered, and
/// schemas without tables still appear.
fn group_summaries(
    schema_names: Vec<String>,
    summaries: Vec<(String, TableSummary)>,
) -> Vec<SchemaMetaData> {
    let mut schemas: Vec<SchemaMetaData> = schema_names
        .into_iter()
        .map(|name| SchemaMetaData {
            name,
            tables: Vec::new(),
        })
        .collect();

    for (schema_name, summary) in summaries {
        if let Some(schema) = schemas.iter_mut().find(|s| s.name == schema_name) {
            schema.tables.push(summary);
        }
    }

    schemas
}

/// Tables, views and materialized views with approximate row counts,
/// ordered by schema then name. `schema` narrows to one schema.
pub(crate) async fn collect_table_summaries(
    conn: &mut PgConnection,
    schema: Option<&str>,
) -> Result<Vec<(String, TableSummary)>> {
    let rows = sqlx::query(
        r#"
        SELECT t.table_schema::text AS schema_name,
               t.table_name::text AS table_name,
               CASE WHEN t.table_type = 'VIEW' THEN 'v' ELSE 'r' END AS relkind,
               s.n_live_tup AS row_count
        FROM information_schema.tables t
        LEFT JOIN pg_stat_user_tables s
               ON s.schemaname = t.table_schema AND s.relname = t.table_name
        WHERE t.table_type IN ('BASE TABLE', 'VIEW')
          AND t.table_schema <> ALL($1)
          AND ($2::text IS NULL OR t.table_schema = $2::text)
        UNION ALL
        SELECT m.schemaname::text, m.matviewname::text, 'm', s.n_live_tup
        FROM pg_matviews m
        LEFT JOIN pg_stat_user_tables s
               ON s.schemaname = m.schemaname AND s.relname = m.matviewname
        WHERE m.schemaname <> ALL($1)
          AND ($2::text IS NULL OR m.schemaname = $2::text)
        ORDER BY schema_name, table_name
        "#,
    )
    .bind(&SYSTEM_SCHEMAS[..])
    .bind(schema)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StudioError::collection_failed("Failed to enumerate tables", e))?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in &rows {
        let schema_name: String = row.get_field("schema_name", None)?;
        let table_name: String = row.get_field("table_name", None)?;
        let relkind: String = row.get_field("relkind", None)?;
        let row_count: Option<i64> = row.get_field("row_count", None)?;

        summaries.push((
            schema_name,
            TableSummary {
                name: table_name,
                kind: classify_relkind(&relkind),
                row_count: non_negative_u64(row_count),
            },
        ));
    }

    Ok(summaries)
}

/// Full descriptor for one relation.
///
/// # Errors
/// Returns `NotFound` when `schema.table` is not a table, view or
/// materialized view.
pub(crate) async fn collect_table(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<TableMetaData> {
    let table_context = format!("{}.{}", schema, table);

    let relation = sqlx::query(
        r#"
        SELECT c.relkind::text AS relkind,
               s.n_live_tup AS row_count,
               CASE WHEN c.relkind IN ('r', 'p', 'm')
                    THEN pg_total_relation_size(c.oid) END AS size_bytes,
               obj_description(c.oid, 'pg_class') AS comment
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_stat_user_tables s ON s.relid = c.oid
        WHERE n.nspname = $1
          AND c.relname = $2
          AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        StudioError::collection_failed(format!("Failed to look up table '{}'", table_context), e)
    })?
    .ok_or_else(|| StudioError::not_found(format!("Table '{}'", table_context)))?;

    let relkind: String = relation.get_field("relkind", Some(&table_context))?;
    let row_count: Option<i64> = relation.get_field("row_count", Some(&table_context))?;
    let size_bytes: Option<i64> = relation.get_field("size_bytes", Some(&table_context))?;
    let comment: Option<String> = relation.get_field("comment", Some(&table_context))?;

    let mut metadata = TableMetaData::new(schema, table, classify_relkind(&relkind));
    metadata.row_count = non_negative_u64(row_count);
    metadata.size_bytes = non_negative_u64(size_bytes);
    metadata.comment = comment;

    metadata.columns = collect_columns(conn, schema, table).await?;
    metadata.primary_key = collect_primary_key(conn, schema, table).await?;
    metadata.foreign_keys = collect_foreign_keys(conn, schema, table).await?;
    metadata.unique_constraints = collect_unique_constraints(conn, schema, table).await?;
    metadata.indexes = collect_indexes(conn, schema, table).await?;
    metadata.check_constraints = collect_check_constraints(conn, schema, table).await?;

    tracing::debug!(
        "Collected {} columns, {} indexes, {} foreign key columns for {}",
        metadata.columns.len(),
        metadata.indexes.len(),
        metadata.foreign_keys.len(),
        table_context
    );

    Ok(metadata)
}

/// Columns ordered by ordinal position, with key membership flags.
///
/// Read from `pg_attribute` so materialized views are covered too. Type
/// names and length/precision/scale follow `information_schema.columns`:
/// domain-typed columns report their base type.
async fn collect_columns(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnMetaData>> {
    let table_context = format!("{}.{}", schema, table);

    let rows = sqlx::query(
        r#"
        SELECT a.attname::text AS column_name,
               a.attnum::int AS position,
               CASE
                   WHEN COALESCE(bt.typelem, t.typelem) <> 0
                        AND COALESCE(bt.typlen, t.typlen) = -1 THEN 'ARRAY'
                   WHEN COALESCE(btn.nspname, tn.nspname) = 'pg_catalog'
                       THEN format_type(COALESCE(bt.oid, t.oid), NULL)
                   ELSE 'USER-DEFINED'
               END AS data_type,
               COALESCE(bt.typname, t.typname)::text AS native_type,
               NOT a.attnotnull AS is_nullable,
               pg_get_expr(d.adbin, d.adrelid) AS column_default,
               information_schema._pg_char_max_length(
                   information_schema._pg_truetypid(a.*, t.*),
                   information_schema._pg_truetypmod(a.*, t.*)
               ) AS max_length,
               information_schema._pg_numeric_precision(
                   information_schema._pg_truetypid(a.*, t.*),
                   information_schema._pg_truetypmod(a.*, t.*)
               ) AS numeric_precision,
               information_schema._pg_numeric_scale(
                   information_schema._pg_truetypid(a.*, t.*),
                   information_schema._pg_truetypmod(a.*, t.*)
               ) AS numeric_scale,
               a.attidentity::text AS identity,
               col_description(c.oid, a.attnum) AS comment,
               EXISTS (
                   SELECT 1 FROM pg_constraint k
                   WHERE k.conrelid = c.oid AND k.contype = 'p' AND a.attnum = ANY (k.conkey)
               ) AS is_primary_key,
               EXISTS (
                   SELECT 1 FROM pg_constraint k
                   WHERE k.conrelid = c.oid AND k.contype = 'f' AND a.attnum = ANY (k.conkey)
               ) AS is_foreign_key,
               EXISTS (
                   SELECT 1 FROM pg_constraint k
                   WHERE k.conrelid = c.oid AND k.contype = 'u' AND a.attnum = ANY (k.conkey)
               ) AS is_unique
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_type t ON t.oid = a.atttypid
        JOIN pg_namespace tn ON tn.oid = t.typnamespace
        LEFT JOIN pg_type bt ON t.typtype = 'd' AND bt.oid = t.typbasetype
        LEFT JOIN pg_namespace btn ON btn.oid = bt.typnamespace
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE n.nspname = $1
          AND c.relname = $2
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attnum
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        StudioError::collection_failed(
            format!("Failed to collect columns for table '{}'", table_context),
            e,
        )
    })?;

    let ctx = Some(table_context.as_str());
    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let position: i32 = row.get_field("position", ctx)?;
        let default_value: Option<String> = row.get_field("column_default", ctx)?;
        let identity: String = row.get_field("identity", ctx)?;

        columns.push(ColumnMetaData {
            name: row.get_field("column_name", ctx)?,
            data_type: row.get_field("data_type", ctx)?,
            native_type: row.get_field("native_type", ctx)?,
            nullable: row.get_field("is_nullable", ctx)?,
            is_auto_increment: is_auto_increment(default_value.as_deref(), &identity),
            default_value,
            max_length: non_negative_u32(row.get_field("max_length", ctx)?),
            precision: non_negative_u32(row.get_field("numeric_precision", ctx)?),
            scale: non_negative_u32(row.get_field("numeric_scale", ctx)?),
            is_primary_key: row.get_field("is_primary_key", ctx)?,
            is_foreign_key: row.get_field("is_foreign_key", ctx)?,
            is_unique: row.get_field("is_unique", ctx)?,
            comment: row.get_field("comment", ctx)?,
            position: u32::try_from(position).unwrap_or_default(),
        });
    }

    Ok(columns)
}

/// Primary-key column names in key order.
async fn collect_primary_key(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    sqlx::query_scalar(
        r#"
        SELECT a.attname::text
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        WHERE n.nspname = $1
          AND c.relname = $2
          AND con.contype = 'p'
        ORDER BY k.ord
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        StudioError::collection_failed(
            format!("Failed to collect primary key for table '{}.{}'", schema, table),
            e,
        )
    })
}

/// One entry per local/referenced column pair, in constraint then key order.
async fn collect_foreign_keys(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyMetaData>> {
    let table_context = format!("{}.{}", schema, table);

    let rows = sqlx::query(
        r#"
        SELECT con.conname::text AS constraint_name,
               la.attname::text AS column_name,
               rn.nspname::text AS referenced_schema,
               rc.relname::text AS referenced_table,
               ra.attname::text AS referenced_column,
               CASE con.confupdtype
                   WHEN 'c' THEN 'CASCADE'
                   WHEN 'n' THEN 'SET NULL'
                   WHEN 'd' THEN 'SET DEFAULT'
                   WHEN 'r' THEN 'RESTRICT'
                   ELSE 'NO ACTION'
               END AS update_rule,
               CASE con.confdeltype
                   WHEN 'c' THEN 'CASCADE'
                   WHEN 'n' THEN 'SET NULL'
                   WHEN 'd' THEN 'SET DEFAULT'
                   WHEN 'r' THEN 'RESTRICT'
                   ELSE 'NO ACTION'
               END AS delete_rule
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_class rc ON rc.oid = con.confrelid
        JOIN pg_namespace rn ON rn.oid = rc.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
            WITH ORDINALITY AS k(local_attnum, referenced_attnum, ord)
        JOIN pg_attribute la ON la.attrelid = con.conrelid AND la.attnum = k.local_attnum
        JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.referenced_attnum
        WHERE n.nspname = $1
          AND c.relname = $2
          AND con.contype = 'f'
        ORDER BY con.conname, k.ord
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        StudioError::collection_failed(
            format!("Failed to collect foreign keys for table '{}'", table_context),
            e,
        )
    })?;

    let ctx = Some(table_context.as_str());
    let mut foreign_keys = Vec::with_capacity(rows.len());
    for row in &rows {
        let update_rule: String = row.get_field("update_rule", ctx)?;
        let delete_rule: String = row.get_field("delete_rule", ctx)?;

        foreign_keys.push(ForeignKeyMetaData {
            constraint_name: row.get_field("constraint_name", ctx)?,
            column_name: row.get_field("column_name", ctx)?,
            referenced_schema: row.get_field("referenced_schema", ctx)?,
            referenced_table: row.get_field("referenced_table", ctx)?,
            referenced_column: row.get_field("referenced_column", ctx)?,
            on_update: map_referential_action(&update_rule),
            on_delete: map_referential_action(&delete_rule),
        });
    }

    Ok(foreign_keys)
}

/// Unique constraints with their columns in key order.
async fn collect_unique_constraints(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<UniqueConstraintMetaData>> {
    let table_context = format!("{}.{}", schema, table);

    let rows = sqlx::query(
        r#"
        SELECT con.conname::text AS constraint_name,
               array_agg(a.attname::text ORDER BY k.ord) AS columns
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        WHERE n.nspname = $1
          AND c.relname = $2
          AND con.contype = 'u'
        GROUP BY con.conname
        ORDER BY con.conname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        StudioError::collection_failed(
            format!(
                "Failed to collect unique constraints for table '{}'",
                table_context
            ),
            e,
        )
    })?;

    let ctx = Some(table_context.as_str());
    rows.iter()
        .map(|row| {
            Ok(UniqueConstraintMetaData {
                name: row.get_field("constraint_name", ctx)?,
                columns: row.get_field("columns", ctx)?,
            })
        })
        .collect()
}

/// Indexes with access method and key column order from `pg_index`.
///
/// Expression keys have no column name and are left out of `columns`; an
/// index built only on expressions is still reported, with no columns.
async fn collect_indexes(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<IndexedMetaData>> {
    let table_context = format!("{}.{}", schema, table);

    let rows = sqlx::query(
        r#"
        SELECT i.relname::text AS index_name,
               COALESCE(
                   array_agg(a.attname::text ORDER BY k.ord)
                       FILTER (WHERE a.attname IS NOT NULL),
                   '{}'::text[]
               ) AS columns,
               ix.indisunique AS is_unique,
               ix.indisprimary AS is_primary,
               am.amname::text AS index_type
        FROM pg_index ix
        JOIN pg_class c ON c.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_am am ON am.oid = i.relam
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        LEFT JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
        WHERE n.nspname = $1
          AND c.relname = $2
        GROUP BY i.relname, ix.indisunique, ix.indisprimary, am.amname
        ORDER BY i.relname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        StudioError::collection_failed(
            format!("Failed to collect indexes for table '{}'", table_context),
            e,
        )
    })?;

    let ctx = Some(table_context.as_str());
    rows.iter()
        .map(|row| {
            Ok(IndexedMetaData {
                name: row.get_field("index_name", ctx)?,
                columns: row.get_field("columns", ctx)?,
                is_unique: row.get_field("is_unique", ctx)?,
                is_primary: row.get_field("is_primary", ctx)?,
                index_type: row.get_field("index_type", ctx)?,
            })
        })
        .collect()
}

async fn collect_check_constraints(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Vec<CheckConstraintMetaData>> {
    let table_context = format!("{}.{}", schema, table);

    let rows = sqlx::query(
        r#"
        SELECT con.conname::text AS constraint_name,
               pg_get_constraintdef(con.oid) AS definition
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relname = $2
          AND con.contype = 'c'
        ORDER BY con.conname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        StudioError::collection_failed(
            format!(
                "Failed to collect check constraints for table '{}'",
                table_context
            ),
            e,
        )
    })?;

    let ctx = Some(table_context.as_str());
    rows.iter()
        .map(|row| {
            Ok(CheckConstraintMetaData {
                name: row.get_field("constraint_name", ctx)?,
                definition: row.get_field("definition", ctx)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableKind;

    fn summary(name: &str) -> TableSummary {
        TableSummary {
            name: name.to_string(),
            kind: TableKind::Table,
            row_count: None,
        }
    }

    #[test]
    fn test_system_schemas() {
        assert!(SYSTEM_SCHEMAS.contains(&"pg_catalog"));
        assert!(SYSTEM_SCHEMAS.contains(&"information_schema"));
        assert!(SYSTEM_SCHEMAS.contains(&"pg_toast"));
        assert!(!SYSTEM_SCHEMAS.contains(&"public"));
    }

    #[test]
    fn test_group_summaries_keeps_empty_schemas() {
        let grouped = group_summaries(
            vec!["analytics".to_string(), "public".to_string()],
            vec![
                ("public".to_string(), summary("orders")),
                ("public".to_string(), summary("users")),
            ],
        );

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].name, "analytics");
        assert!(grouped[0].tables.is_empty());
        let names: Vec<&str> = grouped[1].tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["orders", "users"]);
    }

    #[test]
    fn test_group_summaries_drops_unlisted_schema() {
        let grouped = group_summaries(
            vec!["public".to_string()],
            vec![("hidden".to_string(), summary("secret"))],
        );
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].tables.is_empty());
    }
}
