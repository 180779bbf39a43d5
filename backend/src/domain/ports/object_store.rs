//! Driven port for raw activity stream storage.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised by object storage adapters.
    pub enum ObjectStoreError {
        /// No object is stored under the key.
        NotFound { key: String } => "object not found: {key}",
        /// The key is not a valid relative object path.
        InvalidKey { key: String, message: String } =>
            "invalid object key {key}: {message}",
        /// The backing store failed.
        Io { key: String, message: String } =>
            "object store i/o failed for {key}: {message}",
    }
}

/// Port for writing and reading opaque objects by key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;

    /// Read the object stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
}
