//! Persistence for saved connections.
//!
//! Records hold the connection string only in encrypted form. Every store
//! operation is scoped to the owning user: a record is invisible to anyone
//! else, including on delete.

use crate::models::DatabaseType;
use crate::security::EncryptedData;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a non-blank identifier; blank input yields `None`.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A saved connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Generated record id
    pub id: Uuid,
    /// Display name chosen by the owner
    pub connection_name: String,
    /// Engine the connection string targets
    #[serde(rename = "type")]
    pub database_type: DatabaseType,
    /// Hex ciphertext of the resolved connection string
    pub encrypted_connection_url: String,
    /// Hex IV
    pub iv: String,
    /// Hex authentication tag
    pub auth_tag: String,
    /// Owner; the only user who can read or delete the record
    pub user_id: UserId,
    /// When the record was saved
    pub created_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Creates a record with a fresh id and the current time.
    pub fn new(
        user_id: UserId,
        connection_name: impl Into<String>,
        database_type: DatabaseType,
        encrypted: EncryptedData,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_name: connection_name.into(),
            database_type,
            encrypted_connection_url: encrypted.encrypted,
            iv: encrypted.iv,
            auth_tag: encrypted.auth_tag,
            user_id,
            created_at: Utc::now(),
        }
    }

    /// The stored ciphertext in decryptable form.
    pub fn encrypted_data(&self) -> EncryptedData {
        EncryptedData {
            encrypted: self.encrypted_connection_url.clone(),
            iv: self.iv.clone(),
            auth_tag: self.auth_tag.clone(),
        }
    }
}

/// Saved-connection persistence, scoped by user.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Persists a new record.
    ///
    /// # Errors
    /// Implementations report backend failures.
    async fn insert(&self, record: ConnectionRecord) -> crate::Result<()>;

    /// Fetches `id` if it belongs to `user`.
    async fn get(&self, user: &UserId, id: Uuid) -> crate::Result<Option<ConnectionRecord>>;

    /// All of `user`'s records, oldest first.
    async fn list(&self, user: &UserId) -> crate::Result<Vec<ConnectionRecord>>;

    /// Deletes `id` if it belongs to `user`. Returns whether anything was removed.
    async fn delete(&self, user: &UserId, id: Uuid) -> crate::Result<bool>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryConnectionStore {
    records: RwLock<HashMap<Uuid, ConnectionRecord>>,
}

impl InMemoryConnectionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn insert(&self, record: ConnectionRecord) -> crate::Result<()> {
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, user: &UserId, id: Uuid) -> crate::Result<Option<ConnectionRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&id)
            .filter(|record| &record.user_id == user)
            .cloned())
    }

    async fn list(&self, user: &UserId) -> crate::Result<Vec<ConnectionRecord>> {
        let mut records: Vec<ConnectionRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| &record.user_id == user)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.connection_name.cmp(&b.connection_name))
        });
        Ok(records)
    }

    async fn delete(&self, user: &UserId, id: Uuid) -> crate::Result<bool> {
        let mut records = self.records.write().await;
        let owned = records.get(&id).is_some_and(|record| &record.user_id == user);
        if owned {
            records.remove(&id);
        }
        Ok(owned)
    }
}
