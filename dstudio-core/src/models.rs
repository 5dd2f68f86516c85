//! Metadata type model produced by introspection.
//!
//! Every tree here is an immutable snapshot: a refresh builds a new tree
//! rather than patching an old one. Field names serialize in camelCase so the
//! JSON matches what the dashboard consumes.

use crate::error::StudioError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Database engines dstudio declares support for.
///
/// Declared support is not the same as a working adapter; see
/// [`crate::adapters::create_adapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    /// PostgreSQL
    #[serde(rename = "postgresql")]
    PostgreSQL,
    /// MySQL (declared, not implemented)
    #[serde(rename = "mysql")]
    MySQL,
    /// SQLite (declared, not implemented)
    #[serde(rename = "sqlite")]
    SQLite,
}

impl DatabaseType {
    /// Wire name used in configs and stored records.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Human-readable engine name.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DatabaseType {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Self::PostgreSQL),
            "mysql" => Ok(Self::MySQL),
            "sqlite" => Ok(Self::SQLite),
            other => Err(StudioError::unsupported_database(other)),
        }
    }
}

/// Relation kind as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Ordinary or partitioned table
    #[default]
    Table,
    /// View
    View,
    /// Materialized view
    MaterializedView,
}

/// Referential action on a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// CASCADE
    #[serde(rename = "CASCADE")]
    Cascade,
    /// SET NULL
    #[serde(rename = "SET NULL")]
    SetNull,
    /// SET DEFAULT
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
    /// RESTRICT
    #[serde(rename = "RESTRICT")]
    Restrict,
    /// NO ACTION
    #[default]
    #[serde(rename = "NO ACTION")]
    NoAction,
}

/// Column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetaData {
    /// Column name
    pub name: String,
    /// Portable type name (`integer`, `character varying`, `ARRAY`, `USER-DEFINED`)
    #[serde(rename = "type")]
    pub data_type: String,
    /// Engine-native type name (`int4`, `varchar`, `_text`)
    pub native_type: String,
    /// Whether NULL is allowed
    pub nullable: bool,
    /// Default-value expression
    pub default_value: Option<String>,
    /// Character length limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Numeric precision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    /// Numeric scale
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    /// Member of the primary key
    pub is_primary_key: bool,
    /// Member of any foreign key
    pub is_foreign_key: bool,
    /// Member of any unique constraint
    pub is_unique: bool,
    /// Backed by a sequence or identity
    pub is_auto_increment: bool,
    /// Column comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 1-based ordinal position
    pub position: u32,
}

/// One local-to-referenced column pair of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyMetaData {
    /// Constraint name
    pub constraint_name: String,
    /// Local column
    pub column_name: String,
    /// Schema of the referenced table
    pub referenced_schema: String,
    /// Referenced table
    pub referenced_table: String,
    /// Referenced column
    pub referenced_column: String,
    /// ON UPDATE action
    pub on_update: ReferentialAction,
    /// ON DELETE action
    pub on_delete: ReferentialAction,
}

/// Index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedMetaData {
    /// Index name
    pub name: String,
    /// Indexed columns in key order
    pub columns: Vec<String>,
    /// Unique index
    pub is_unique: bool,
    /// Backs the primary key
    pub is_primary: bool,
    /// Access method (`btree`, `hash`, `gin`, ...)
    #[serde(rename = "type")]
    pub index_type: String,
}

/// Unique constraint with its column grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraintMetaData {
    /// Constraint name
    pub name: String,
    /// Constrained columns in key order
    pub columns: Vec<String>,
}

/// Check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConstraintMetaData {
    /// Constraint name
    pub name: String,
    /// Constraint definition, e.g. `CHECK ((price > 0))`
    pub definition: String,
}

/// Full descriptor for one relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetaData {
    /// Table name
    pub name: String,
    /// Owning schema
    pub schema: String,
    /// Relation kind
    #[serde(rename = "type")]
    pub kind: TableKind,
    /// Columns ordered by ordinal position
    pub columns: Vec<ColumnMetaData>,
    /// Primary-key columns in key order
    pub primary_key: Vec<String>,
    /// Foreign key column pairs
    pub foreign_keys: Vec<ForeignKeyMetaData>,
    /// Unique constraints
    pub unique_constraints: Vec<UniqueConstraintMetaData>,
    /// Indexes
    pub indexes: Vec<IndexedMetaData>,
    /// Check constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check_constraints: Vec<CheckConstraintMetaData>,
    /// Approximate live rows, from planner statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Approximate on-disk size in bytes
    #[serde(rename = "size", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Table comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableMetaData {
    /// Creates an empty descriptor for `schema.name`.
    pub fn new(schema: impl Into<String>, name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            kind,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
            indexes: Vec::new(),
            check_constraints: Vec::new(),
            row_count: None,
            size_bytes: None,
            comment: None,
        }
    }

    /// Structured cache key for this table.
    pub fn key(&self) -> TableKey {
        TableKey::new(&self.schema, &self.name)
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMetaData> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Lightweight table entry inside a schema listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    /// Table name
    pub name: String,
    /// Relation kind
    #[serde(rename = "type")]
    pub kind: TableKind,
    /// Approximate live rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

/// Schema with its table summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetaData {
    /// Schema name
    pub name: String,
    /// Tables, views and materialized views ordered by name
    pub tables: Vec<TableSummary>,
}

/// Whole-database discovery result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetaData {
    /// Engine
    #[serde(rename = "type")]
    pub database_type: DatabaseType,
    /// Server version string
    pub version: String,
    /// Non-system schemas ordered by name
    pub schemas: Vec<SchemaMetaData>,
}

impl DatabaseMetaData {
    /// Iterates `(schema, table)` pairs in schema then table order.
    pub fn table_keys(&self) -> impl Iterator<Item = TableKey> + '_ {
        self.schemas.iter().flat_map(|schema| {
            schema
                .tables
                .iter()
                .map(move |table| TableKey::new(&schema.name, &table.name))
        })
    }

    /// Total number of relations across all schemas.
    pub fn table_count(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }
}

/// One page of rows from a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    /// Rows as JSON objects keyed by column name
    pub rows: Vec<JsonValue>,
    /// Exact row count of the whole table
    pub total_count: u64,
    /// Keys of the first row, empty when no rows came back
    pub columns: Vec<String>,
}

/// Result of an ad hoc query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Rows as JSON objects keyed by column name
    pub rows: Vec<JsonValue>,
    /// Number of rows returned
    pub row_count: u64,
    /// Keys of the first row, empty when no rows came back
    pub fields: Vec<String>,
}

/// Outcome of a liveness check. Never an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTest {
    /// Whether the liveness query succeeded
    pub success: bool,
    /// Driver message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionTest {
    /// A passing check.
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failing check with the given message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Structured `(schema, table)` identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
}

impl TableKey {
    /// Creates a key.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Pagination window for [`TableData`] fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number
    pub page: u32,
    /// Rows per page
    pub page_size: u32,
}

impl Pagination {
    /// Page used when the caller does not ask for one.
    pub const DEFAULT_PAGE: u32 = 1;
    /// Page size used when the caller does not ask for one.
    pub const DEFAULT_PAGE_SIZE: u32 = 50;

    /// Resolves optional caller input; page 0 is page 1, size 0 is the default.
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.unwrap_or(Self::DEFAULT_PAGE).max(1);
        let page_size = match page_size {
            Some(0) | None => Self::DEFAULT_PAGE_SIZE,
            Some(size) => size,
        };
        Self { page, page_size }
    }

    /// `LIMIT` value.
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    /// `OFFSET` value, `(page - 1) * page_size`.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)).saturating_mul(i64::from(self.page_size))
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}
