use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for session store operations. The store never retries
/// internally; callers decide what an unavailable store means for them.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Key-value contract backing the session registry.
///
/// Single-record operations are atomic; no cross-operation transactions are
/// assumed. The reverse lookup is a maintained secondary index, never a scan.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert a session record. Overwrites any prior handle for the id.
    async fn put(&self, session_id: &str, connection_handle: &str) -> Result<(), StoreError>;

    async fn get(&self, session_id: &str) -> Result<Option<String>, StoreError>;

    /// Fetch many records at once; ids with no record are omitted.
    async fn batch_get(
        &self,
        session_ids: &[String],
    ) -> Result<HashMap<String, String>, StoreError>;

    /// Reverse lookup via the secondary index on `connection_handle`.
    async fn get_by_handle(&self, connection_handle: &str) -> Result<Option<String>, StoreError>;

    /// Idempotent delete by primary key.
    async fn delete_by_session(&self, session_id: &str) -> Result<(), StoreError>;

    /// Idempotent delete of whatever record currently references the handle.
    async fn delete_by_handle(&self, connection_handle: &str) -> Result<(), StoreError>;
}
