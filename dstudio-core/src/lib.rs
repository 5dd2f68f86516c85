//! Core library for dstudio, a web-based database studio backend.
//!
//! Connects to a relational database through a uniform adapter interface,
//! introspects its metadata (schemas, tables, columns, keys, indexes,
//! constraints, statistics), pages through table data, and runs ad-hoc SQL.
//! Saved connection strings are protected with AES-256-GCM.
//!
//! # Security Guarantees
//! - Connection strings are stored only as authenticated ciphertext
//! - Passwords and the encryption key never appear in logs or `Debug` output
//! - The encryption key is validated once at startup; a bad key is fatal
//!
//! # Architecture
//! - `adapters`: the [`DatabaseAdapter`] trait, its factory, and the
//!   PostgreSQL implementation (feature `postgresql`)
//! - `actions`: user-scoped operations returning [`actions::ActionResult`]
//! - `store` / `cache`: saved-connection persistence and the browsing session
//! - `security`: connection-string encryption

pub mod actions;
pub mod adapters;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod security;
pub mod store;

// Re-export commonly used types
pub use actions::{ActionResult, ConnectionSummary, SavedConnection, StudioActions};
pub use adapters::{
    AdapterFeature, AdapterOptions, ConnectionConfig, DatabaseAdapter, create_adapter,
    create_adapter_for_type_name, create_adapter_with_options, supported_databases,
};
pub use cache::{Session, TableMetadataCache};
pub use config::StudioConfig;
pub use error::{Result, StudioError};
pub use logging::{LogFormat, init_logging};
pub use models::{
    CheckConstraintMetaData, ColumnMetaData, ConnectionTest, DatabaseMetaData, DatabaseType,
    ForeignKeyMetaData, IndexedMetaData, Pagination, QueryResult, ReferentialAction,
    SchemaMetaData, TableData, TableKey, TableKind, TableMetaData, TableSummary,
    UniqueConstraintMetaData,
};
pub use security::{ConnectionEncryptor, EncryptedData, EncryptionKey};
pub use store::{ConnectionRecord, ConnectionStore, InMemoryConnectionStore, UserId};
