//! Helper utilities for SQL adapter implementations.
//!
//! Row decoding with consistent error context, identifier quoting for the
//! statements that cannot bind a table name, and conversion of simple-protocol
//! rows into JSON objects.

use crate::{Result, error::StudioError};
use serde_json::{Map, Value as JsonValue};
use sqlx::{Column, Decode, Postgres, Row, TypeInfo, ValueRef, postgres::PgRow};

/// Extension trait for extracting typed values from database rows
/// with consistent error handling.
///
/// # Example
/// ```rust,ignore
/// use dstudio_core::adapters::helpers::RowExt;
///
/// let name: String = row.get_field("column_name", Some("public.users"))?;
/// let size: Option<i64> = row.get_field("size_bytes", None)?;
/// ```
pub trait RowExt {
    /// Extracts a typed field from the row with proper error context.
    ///
    /// # Arguments
    /// * `field_name` - Name of the column to extract
    /// * `table_context` - Optional table name for error messages
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: Decode<'r, Postgres> + sqlx::Type<Postgres>;
}

impl RowExt for PgRow {
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        self.try_get(field_name)
            .map_err(|e| StudioError::parse_field(field_name, table_context, e))
    }
}

/// Quotes an identifier for PostgreSQL, doubling embedded quotes.
///
/// ```rust
/// use dstudio_core::adapters::helpers::quote_ident;
///
/// assert_eq!(quote_ident("users"), r#""users""#);
/// assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// `"schema"."table"` with both parts quoted.
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Converts a text-format value to JSON using its PostgreSQL type name.
///
/// Booleans, integers, floats and JSON documents become native JSON values.
/// `NUMERIC` stays a string so no precision is lost; anything that fails to
/// parse also falls back to a string.
pub fn text_value_to_json(type_name: &str, text: &str) -> JsonValue {
    match type_name {
        "BOOL" => match text {
            "t" | "true" => JsonValue::Bool(true),
            "f" | "false" => JsonValue::Bool(false),
            _ => JsonValue::String(text.to_string()),
        },
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map_or_else(|_| JsonValue::String(text.to_string()), JsonValue::from),
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| JsonValue::String(text.to_string()), JsonValue::Number),
        "JSON" | "JSONB" => serde_json::from_str(text)
            .unwrap_or_else(|_| JsonValue::String(text.to_string())),
        _ => JsonValue::String(text.to_string()),
    }
}

/// Converts a row fetched over the simple query protocol into a JSON object.
///
/// Simple-protocol rows arrive in text format, so every non-null value is
/// decoded as `&str` and then typed by [`text_value_to_json`].
pub fn pg_row_to_json(row: &PgRow) -> Result<Map<String, JsonValue>> {
    let mut object = Map::with_capacity(row.columns().len());

    for column in row.columns() {
        let raw = row
            .try_get_raw(column.ordinal())
            .map_err(|e| StudioError::parse_field(column.name(), None, e))?;

        let value = if raw.is_null() {
            JsonValue::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            let text = <&str as Decode<Postgres>>::decode(raw).map_err(|e| {
                StudioError::QueryExecution {
                    context: format!("Failed to decode column '{}'", column.name()),
                    source: e,
                }
            })?;
            text_value_to_json(&type_name, text)
        };

        object.insert(column.name().to_string(), value);
    }

    Ok(object)
}

/// Keys of the first JSON object in `rows`, in column order.
pub fn first_row_keys(rows: &[JsonValue]) -> Vec<String> {
    rows.first()
        .and_then(JsonValue::as_object)
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default()
}
