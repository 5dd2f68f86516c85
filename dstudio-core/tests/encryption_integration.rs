//! Property tests for connection-string encryption.

use dstudio_core::{
    ConnectionConfig, ConnectionEncryptor, DatabaseType, EncryptedData, EncryptionKey,
    StudioError,
};
use proptest::prelude::*;

fn encryptor_from(seed: [u8; 32]) -> ConnectionEncryptor {
    ConnectionEncryptor::new(EncryptionKey::from_bytes(seed))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn encryption_roundtrip_any_text(seed in any::<[u8; 32]>(), plaintext in ".*") {
        let encryptor = encryptor_from(seed);
        let sealed = encryptor.encrypt(&plaintext).unwrap();
        prop_assert_eq!(encryptor.decrypt(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn encryption_fresh_iv_and_ciphertext(plaintext in "[a-z0-9:/@.]{1,64}") {
        let encryptor = encryptor_from([3u8; 32]);
        let first = encryptor.encrypt(&plaintext).unwrap();
        let second = encryptor.encrypt(&plaintext).unwrap();
        prop_assert_ne!(&first.iv, &second.iv);
        prop_assert_ne!(&first.encrypted, &second.encrypted);
    }

    #[test]
    fn encryption_fields_are_lowercase_hex(plaintext in ".{0,128}") {
        let sealed = encryptor_from([9u8; 32]).encrypt(&plaintext).unwrap();
        prop_assert_eq!(sealed.iv.len(), 32);
        prop_assert_eq!(sealed.auth_tag.len(), 32);
        prop_assert_eq!(sealed.encrypted.len(), plaintext.len().saturating_mul(2));
        for field in [&sealed.encrypted, &sealed.iv, &sealed.auth_tag] {
            prop_assert!(field.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn integrity_rejects_other_keys(
        a in any::<[u8; 32]>(),
        b in any::<[u8; 32]>(),
        plaintext in "[ -~]{0,64}",
    ) {
        prop_assume!(a != b);
        let sealed = encryptor_from(a).encrypt(&plaintext).unwrap();
        let err = encryptor_from(b).decrypt(&sealed).unwrap_err();
        prop_assert!(matches!(err, StudioError::Integrity { .. }), "expected StudioError::Integrity");
    }
}

#[test]
fn test_connection_config_encryption_roundtrip() {
    let encryptor = ConnectionEncryptor::new(EncryptionKey::generate());
    let config = ConnectionConfig::new(DatabaseType::PostgreSQL)
        .with_host("db.internal")
        .with_port(5433)
        .with_database("app")
        .with_username("svc")
        .with_password("s3cr3t!")
        .with_ssl(true);

    let sealed = encryptor.encrypt_connection_data(&config).unwrap();
    let json = serde_json::to_string(&sealed).unwrap();
    assert!(!json.contains("s3cr3t"));

    let restored: ConnectionConfig = encryptor
        .decrypt_connection_data(&serde_json::from_str::<EncryptedData>(&json).unwrap())
        .unwrap();
    assert_eq!(restored.host.as_deref(), Some("db.internal"));
    assert_eq!(restored.port, Some(5433));
    assert_eq!(restored.password.as_deref(), Some("s3cr3t!"));
    assert!(restored.ssl);
}

#[test]
fn test_generated_key_reloads_from_hex() {
    let key = EncryptionKey::generate();
    let hex_key = key.to_hex();
    assert_eq!(hex_key.len(), 64);

    let sealed = ConnectionEncryptor::new(key).encrypt("postgres://u:p@h/db").unwrap();
    let reloaded = ConnectionEncryptor::new(EncryptionKey::from_hex(&hex_key).unwrap());
    assert_eq!(reloaded.decrypt(&sealed).unwrap(), "postgres://u:p@h/db");
}
