//! AES-256-GCM protection for stored connection strings.
//!
//! Each call draws a fresh random 128-bit IV. The 16-byte authentication tag
//! is detached from the ciphertext, and the stored form keeps ciphertext, IV
//! and tag as three separate lowercase-hex fields.
//!
//! # Security Guarantees
//! - Authenticated encryption: any change to ciphertext, IV or tag is rejected
//! - No IV reuse (each encryption draws a new IV from the OS RNG)
//! - Key material is zeroed on drop and never printed by `Debug`

use crate::Result;
use crate::error::StudioError;
use aes_gcm::{
    AesGcm,
    aead::{
        Aead, AeadCore, KeyInit, OsRng, consts::U16, generic_array::GenericArray,
        rand_core::RngCore,
    },
    aes::Aes256,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use zeroize::Zeroizing;

/// Environment variable holding the 64-hex-character key.
pub const ENCRYPTION_KEY_ENV: &str = "ENCRYPTION_KEY";

/// IV size: 128 bits.
const IV_SIZE: usize = 16;

/// Authentication tag size: 128 bits.
const AUTH_TAG_SIZE: usize = 16;

/// AES-256 key size.
const AES_KEY_SIZE: usize = 32;

/// AES-256-GCM with a 16-byte nonce.
type ConnectionCipher = AesGcm<Aes256, U16>;

/// A validated 256-bit key.
#[derive(Clone)]
pub struct EncryptionKey(Zeroizing<[u8; AES_KEY_SIZE]>);

impl EncryptionKey {
    /// Parses a 64-character hex key.
    ///
    /// # Errors
    /// Returns a configuration error when the length is wrong or the value is
    /// not hex.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let hex_key = hex_key.trim();
        if hex_key.len() != AES_KEY_SIZE.saturating_mul(2) {
            return Err(StudioError::configuration(format!(
                "{} must be {} hex characters ({} bytes), got {} characters",
                ENCRYPTION_KEY_ENV,
                AES_KEY_SIZE.saturating_mul(2),
                AES_KEY_SIZE,
                hex_key.len()
            )));
        }

        let mut bytes = Zeroizing::new([0u8; AES_KEY_SIZE]);
        hex::decode_to_slice(hex_key, bytes.as_mut_slice()).map_err(|e| {
            StudioError::configuration(format!("{} is not valid hex: {}", ENCRYPTION_KEY_ENV, e))
        })?;
        Ok(Self(bytes))
    }

    /// Reads and validates `ENCRYPTION_KEY` from the process environment.
    ///
    /// # Errors
    /// Returns a configuration error when the variable is absent or malformed.
    pub fn from_env() -> Result<Self> {
        let value = Zeroizing::new(std::env::var(ENCRYPTION_KEY_ENV).map_err(|_| {
            StudioError::configuration(format!("{} is not set", ENCRYPTION_KEY_ENV))
        })?);
        Self::from_hex(&value)
    }

    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; AES_KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Draws a new random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; AES_KEY_SIZE]);
        OsRng.fill_bytes(bytes.as_mut_slice());
        Self(bytes)
    }

    /// Hex form, suitable for `ENCRYPTION_KEY`.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0.as_slice()))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(****)")
    }
}

/// Stored form of an encrypted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedData {
    /// Ciphertext without the tag, hex
    pub encrypted: String,
    /// 16-byte IV, hex
    pub iv: String,
    /// 16-byte authentication tag, hex
    pub auth_tag: String,
}

/// Encrypts and decrypts connection secrets with one preshared key.
#[derive(Clone)]
pub struct ConnectionEncryptor {
    key: EncryptionKey,
}

impl std::fmt::Debug for ConnectionEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEncryptor")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

impl ConnectionEncryptor {
    /// Creates an encryptor for `key`.
    pub const fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Creates an encryptor from `ENCRYPTION_KEY`.
    ///
    /// # Errors
    /// Returns a configuration error when the variable is absent or malformed.
    pub fn from_env() -> Result<Self> {
        EncryptionKey::from_env().map(Self::new)
    }

    fn cipher(&self) -> Result<ConnectionCipher> {
        ConnectionCipher::new_from_slice(self.key.0.as_slice())
            .map_err(|_| StudioError::encryption("Invalid key length"))
    }

    /// Encrypts `plaintext` under a fresh random IV.
    ///
    /// # Errors
    /// Returns an encryption error if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedData> {
        let cipher = self.cipher()?;
        let iv = ConnectionCipher::generate_nonce(&mut OsRng);

        let sealed = cipher
            .encrypt(&iv, plaintext.as_bytes())
            .map_err(|_| StudioError::encryption("AES-GCM encryption failed"))?;

        let split = sealed
            .len()
            .checked_sub(AUTH_TAG_SIZE)
            .ok_or_else(|| StudioError::encryption("Sealed output shorter than tag"))?;
        let (ciphertext, auth_tag) = sealed.split_at(split);

        Ok(EncryptedData {
            encrypted: hex::encode(ciphertext),
            iv: hex::encode(iv),
            auth_tag: hex::encode(auth_tag),
        })
    }

    /// Decrypts the three stored fields back to the plaintext.
    ///
    /// # Errors
    /// - Encryption error for malformed hex or wrong IV/tag lengths
    /// - Integrity error when the tag does not verify (tampering, corruption
    ///   or a different key)
    pub fn decrypt(&self, data: &EncryptedData) -> Result<String> {
        let ciphertext = decode_hex_field("ciphertext", &data.encrypted)?;
        let iv = decode_hex_field("IV", &data.iv)?;
        let auth_tag = decode_hex_field("authentication tag", &data.auth_tag)?;

        if iv.len() != IV_SIZE {
            return Err(StudioError::encryption(format!(
                "Invalid IV length: expected {}, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        if auth_tag.len() != AUTH_TAG_SIZE {
            return Err(StudioError::encryption(format!(
                "Invalid authentication tag length: expected {}, got {}",
                AUTH_TAG_SIZE,
                auth_tag.len()
            )));
        }

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&auth_tag);

        let cipher = self.cipher()?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(GenericArray::from_slice(&iv), sealed.as_slice())
                .map_err(|_| {
                    StudioError::integrity(
                        "authentication tag mismatch; stored ciphertext was altered or the key differs",
                    )
                })?,
        );

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| StudioError::encryption("Decrypted payload is not valid UTF-8"))
    }

    /// Serializes `value` to JSON and encrypts it.
    ///
    /// # Errors
    /// Returns a serialization error if `value` cannot be encoded.
    pub fn encrypt_connection_data<T: Serialize>(&self, value: &T) -> Result<EncryptedData> {
        let json = Zeroizing::new(
            serde_json::to_string(value)
                .map_err(|e| StudioError::serialization("Failed to encode connection data", e))?,
        );
        self.encrypt(&json)
    }

    /// Decrypts and deserializes a value sealed by
    /// [`encrypt_connection_data`](Self::encrypt_connection_data).
    ///
    /// # Errors
    /// Same as [`decrypt`](Self::decrypt), plus a serialization error when
    /// the plaintext is not the expected JSON shape.
    pub fn decrypt_connection_data<T: DeserializeOwned>(&self, data: &EncryptedData) -> Result<T> {
        let json = Zeroizing::new(self.decrypt(data)?);
        serde_json::from_str(&json)
            .map_err(|e| StudioError::serialization("Failed to decode connection data", e))
    }
}

fn decode_hex_field(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| StudioError::encryption(format!("Malformed {} encoding: {}", field, e)))
}
