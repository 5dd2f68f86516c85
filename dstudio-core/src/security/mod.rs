//! Protection of connection secrets at rest.
//!
//! # Module Structure
//! - `encryption`: AES-256-GCM with a preshared key and detached tags

pub mod encryption;

pub use encryption::{ConnectionEncryptor, ENCRYPTION_KEY_ENV, EncryptedData, EncryptionKey};
