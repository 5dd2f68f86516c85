//! Session-scoped table descriptor cache.
//!
//! Entries are keyed by a structured [`TableKey`] and expire after a fixed
//! TTL. A [`Session`] ties the cache to the connection being browsed and
//! clears it whenever a different connection is opened.

use crate::models::{DatabaseMetaData, TableKey, TableMetaData};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct CacheEntry {
    table: TableMetaData,
    inserted_at: Instant,
}

/// TTL cache of [`TableMetaData`] keyed by `(schema, table)`.
#[derive(Debug)]
pub struct TableMetadataCache {
    ttl: Duration,
    entries: RwLock<HashMap<TableKey, CacheEntry>>,
}

impl TableMetadataCache {
    /// Creates an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Entry lifetime.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.inserted_at.elapsed() < self.ttl
    }

    /// Returns a fresh entry, or `None` if absent or expired.
    ///
    /// An expired entry is dropped on the miss.
    pub async fn get(&self, key: &TableKey) -> Option<TableMetaData> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if self.is_fresh(entry) => return Some(entry.table.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !self.is_fresh(entry)) {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.table.clone())
    }

    /// Stores `table` under its own key, replacing any previous entry.
    /// Expired entries are evicted first.
    pub async fn insert(&self, table: TableMetaData) {
        let key = table.key();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| self.is_fresh(entry));
        entries.insert(
            key,
            CacheEntry {
                table,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Stores every table in `tables`, evicting expired entries first.
    pub async fn extend(&self, tables: impl IntoIterator<Item = TableMetaData>) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| self.is_fresh(entry));
        for table in tables {
            entries.insert(
                table.key(),
                CacheEntry {
                    table,
                    inserted_at: now,
                },
            );
        }
    }

    /// Removes and returns the entry for `key`, fresh or not.
    pub async fn remove(&self, key: &TableKey) -> Option<TableMetaData> {
        self.entries.write().await.remove(key).map(|entry| entry.table)
    }

    /// Drops expired entries and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry));
        before.saturating_sub(entries.len())
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// The connection currently being browsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConnection {
    /// Id of the saved connection record
    pub connection_id: Uuid,
    /// Display name given when the connection was saved
    pub connection_name: String,
}

/// Browsing state: the active connection, its last metadata tree, and the
/// table cache.
#[derive(Debug)]
pub struct Session {
    active: RwLock<Option<(ActiveConnection, DatabaseMetaData)>>,
    tables: TableMetadataCache,
}

impl Session {
    /// Creates an idle session whose table cache uses `cache_ttl`.
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            active: RwLock::new(None),
            tables: TableMetadataCache::new(cache_ttl),
        }
    }

    /// Makes `connection` active with `metadata`.
    ///
    /// Switching to a different connection clears the table cache; refreshing
    /// the active one keeps it.
    pub async fn start(&self, connection: ActiveConnection, metadata: DatabaseMetaData) {
        let mut active = self.active.write().await;
        let same_connection = active
            .as_ref()
            .is_some_and(|(current, _)| current.connection_id == connection.connection_id);

        if !same_connection {
            self.tables.clear().await;
            tracing::debug!(
                "Started session for connection '{}'",
                connection.connection_name
            );
        }
        *active = Some((connection, metadata));
    }

    /// Forgets the active connection and everything cached for it.
    pub async fn end(&self) {
        *self.active.write().await = None;
        self.tables.clear().await;
    }

    /// The connection being browsed, if any.
    pub async fn active_connection(&self) -> Option<ActiveConnection> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|(connection, _)| connection.clone())
    }

    /// Metadata tree from the last `start`.
    pub async fn metadata(&self) -> Option<DatabaseMetaData> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|(_, metadata)| metadata.clone())
    }

    /// Whether `connection_id` is the active connection.
    pub async fn is_active(&self, connection_id: Uuid) -> bool {
        self.active
            .read()
            .await
            .as_ref()
            .is_some_and(|(connection, _)| connection.connection_id == connection_id)
    }

    /// Table cache for the active connection.
    pub fn tables(&self) -> &TableMetadataCache {
        &self.tables
    }
}
