//! Configuration types for database adapters.
//!
//! - `ConnectionConfig`: where to connect and with which credentials
//! - `AdapterOptions`: connect timeouts applied to each per-call connection

mod connection;
mod options;

pub use connection::ConnectionConfig;
pub use options::AdapterOptions;
