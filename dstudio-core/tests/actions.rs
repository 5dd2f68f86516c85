//! Action layer tests: envelopes, user scoping, encrypted records, and the
//! full save-and-browse flow against a live PostgreSQL container.

use dstudio_core::{
    ConnectionConfig, ConnectionEncryptor, ConnectionRecord, ConnectionStore, DatabaseType,
    EncryptionKey, InMemoryConnectionStore, StudioActions, StudioConfig, TableKey, UserId,
};
use std::sync::Arc;
use std::time::Duration;

fn config_with_key(key: EncryptionKey) -> StudioConfig {
    StudioConfig::new(key)
        .with_connect_timeout(Duration::from_secs(3))
        .with_test_connect_timeout(Duration::from_secs(3))
        .with_max_concurrent_table_fetches(4)
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

/// Stores a record sealed under `key` and returns its id.
async fn seed_record(
    store: &InMemoryConnectionStore,
    key: EncryptionKey,
    owner: &UserId,
    url: &str,
) -> uuid::Uuid {
    let sealed = ConnectionEncryptor::new(key).encrypt(url).unwrap();
    let record = ConnectionRecord::new(owner.clone(), "seeded", DatabaseType::PostgreSQL, sealed);
    let id = record.id;
    store.insert(record).await.unwrap();
    id
}

#[tokio::test]
async fn test_every_action_requires_identity() {
    let actions = StudioActions::new(
        &config_with_key(EncryptionKey::generate()),
        Arc::new(InMemoryConnectionStore::new()),
    )
    .unwrap();
    let config = ConnectionConfig::new(DatabaseType::PostgreSQL).with_host("localhost");
    let id = uuid::Uuid::new_v4();

    let errors = [
        actions.test_connection_to_database(None, &config).await.error,
        actions
            .save_connection_and_fetch_metadata(None, "prod", &config)
            .await
            .error,
        actions.open_connection(None, id).await.error,
        actions.get_table_schema(None, id, "public", "users").await.error,
        actions
            .get_table_data(None, id, "public", "users", None, None)
            .await
            .error,
        actions.execute_query(None, id, "SELECT 1").await.error,
        actions.list_connections(None).await.error,
        actions.delete_connection(None, id).await.error,
    ];
    for error in errors {
        assert_eq!(error.as_deref(), Some("Unauthorized"));
    }
}

#[tokio::test]
async fn test_unimplemented_engine_reported_in_envelope() {
    let actions = StudioActions::new(
        &config_with_key(EncryptionKey::generate()),
        Arc::new(InMemoryConnectionStore::new()),
    )
    .unwrap();
    let config = ConnectionConfig::new(DatabaseType::MySQL).with_host("localhost");

    let result = actions
        .test_connection_to_database(Some(&user("alice")), &config)
        .await;
    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("MySQL adapter not yet implemented")
    );
}

#[tokio::test]
async fn test_unreachable_database_is_error_envelope() {
    let store = Arc::new(InMemoryConnectionStore::new());
    let actions =
        StudioActions::new(&config_with_key(EncryptionKey::generate()), store.clone()).unwrap();
    let config =
        ConnectionConfig::from_url(DatabaseType::PostgreSQL, "postgres://u:pw@127.0.0.1:9/db");
    let alice = user("alice");

    let tested = actions
        .test_connection_to_database(Some(&alice), &config)
        .await;
    assert!(!tested.success);
    assert!(tested.error.unwrap().starts_with("Connection test failed"));

    let saved = actions
        .save_connection_and_fetch_metadata(Some(&alice), "broken", &config)
        .await;
    assert!(!saved.success);
    // Nothing is persisted when the test fails.
    assert!(store.list(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_records_are_scoped_to_owner() {
    let key = EncryptionKey::generate();
    let store = Arc::new(InMemoryConnectionStore::new());
    let actions = StudioActions::new(&config_with_key(key.clone()), store.clone()).unwrap();
    let alice = user("alice");
    let bob = user("bob");
    let id = seed_record(&store, key, &alice, "postgres://u:pw@127.0.0.1:9/db").await;

    let listed = actions.list_connections(Some(&alice)).await.data.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert!(
        actions
            .list_connections(Some(&bob))
            .await
            .data
            .unwrap()
            .is_empty()
    );

    let result = actions.open_connection(Some(&bob), id).await;
    assert!(result.error.unwrap().ends_with("not found"));

    let result = actions.delete_connection(Some(&bob), id).await;
    assert!(!result.success);
    let result = actions.delete_connection(Some(&alice), id).await;
    assert!(result.success);
    assert!(store.get(&alice, id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_record_sealed_under_other_key_fails_integrity() {
    let store = Arc::new(InMemoryConnectionStore::new());
    let actions =
        StudioActions::new(&config_with_key(EncryptionKey::generate()), store.clone()).unwrap();
    let alice = user("alice");
    let id = seed_record(
        &store,
        EncryptionKey::generate(),
        &alice,
        "postgres://u:pw@127.0.0.1:9/db",
    )
    .await;

    let result = actions.open_connection(Some(&alice), id).await;
    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Integrity check failed"));

    let result = actions.execute_query(Some(&alice), id, "SELECT 1").await;
    assert!(result.error.unwrap().starts_with("Integrity check failed"));
}

#[cfg(feature = "postgresql")]
mod live {
    use super::*;
    use dstudio_core::{DatabaseAdapter, create_adapter};
    use testcontainers_modules::{postgres::Postgres, testcontainers::runners::AsyncRunner};

    async fn wait_until_ready(adapter: &dyn DatabaseAdapter) {
        for _ in 0..30 {
            if adapter.test_connection().await.success {
                return;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        panic!("PostgreSQL did not become ready");
    }

    #[tokio::test]
    async fn test_save_and_browse_integration() {
        let postgres = Postgres::default().start().await.unwrap();
        let port = postgres.get_host_port_ipv4(5432).await.unwrap();
        let config = ConnectionConfig::new(DatabaseType::PostgreSQL)
            .with_host("127.0.0.1")
            .with_port(port)
            .with_database("postgres")
            .with_username("postgres")
            .with_password("postgres");

        let adapter = create_adapter(&config).unwrap();
        wait_until_ready(adapter.as_ref()).await;
        adapter
            .execute_query(
                "CREATE TABLE users (id serial primary key, email text unique not null);
                 CREATE TABLE posts (id serial primary key, author_id int references users(id));
                 CREATE TABLE tags (id serial primary key, label text);
                 INSERT INTO users (email) VALUES ('a@example.com'), ('b@example.com');",
            )
            .await
            .unwrap();

        let store = Arc::new(InMemoryConnectionStore::new());
        let actions =
            StudioActions::new(&config_with_key(EncryptionKey::generate()), store.clone())
                .unwrap();
        let alice = user("alice");

        let saved = actions
            .save_connection_and_fetch_metadata(Some(&alice), "local", &config)
            .await
            .data
            .unwrap();

        // Details come back in the same order as the metadata tree.
        let expected: Vec<TableKey> = saved.metadata.table_keys().collect();
        let actual: Vec<TableKey> = saved.table_details.iter().map(|t| t.key()).collect();
        assert_eq!(actual, expected);
        assert_eq!(saved.table_details.len(), 3);

        // The stored record holds ciphertext only.
        let record = store.get(&alice, saved.connection_id).await.unwrap().unwrap();
        assert!(!record.encrypted_connection_url.contains("postgres"));
        assert_eq!(record.connection_name, "local");

        // The session is primed with every table.
        assert!(actions.session().is_active(saved.connection_id).await);
        assert_eq!(actions.session().tables().len().await, 3);

        let users = actions
            .get_table_schema(Some(&alice), saved.connection_id, "public", "users")
            .await
            .data
            .unwrap();
        assert_eq!(users.primary_key, ["id"]);

        let data = actions
            .get_table_data(Some(&alice), saved.connection_id, "public", "users", None, None)
            .await
            .data
            .unwrap();
        assert_eq!(data.total_count, 2);
        assert_eq!(data.columns, ["id", "email"]);

        let query = actions
            .execute_query(
                Some(&alice),
                saved.connection_id,
                "SELECT email FROM users ORDER BY id",
            )
            .await
            .data
            .unwrap();
        assert_eq!(query.row_count, 2);
        assert_eq!(query.rows[0]["email"], "a@example.com");

        let metadata = actions
            .open_connection(Some(&alice), saved.connection_id)
            .await
            .data
            .unwrap();
        assert_eq!(metadata.table_count(), 3);

        assert!(
            actions
                .delete_connection(Some(&alice), saved.connection_id)
                .await
                .success
        );
        assert!(actions.session().active_connection().await.is_none());
    }
}
