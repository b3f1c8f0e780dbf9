//! Session registry: `session_id -> connection_handle` with a reverse index
//!
//! The mapping lives behind the [`SessionStore`] trait so the flows can run
//! against an in-memory store in tests and Redis in deployment. The registry
//! exclusively owns session records; flows never touch the store directly.

mod memory;
mod redis_store;
mod store;

use std::collections::HashMap;
use std::sync::Arc;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;
pub use store::{SessionStore, StoreError};

use crate::config::{StoreBackend, StoreConfig};

/// Build the session store selected by configuration.
pub async fn create_session_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemorySessionStore::new())),
        StoreBackend::Redis => {
            let store = RedisSessionStore::connect(&config.redis_url, &config.key_prefix).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Facade over the store with the operations the flows need.
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: Arc<dyn SessionStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Upsert; overwrites any prior handle for the session (last-write-wins
    /// on reconnect races).
    pub async fn put(&self, session_id: &str, connection_handle: &str) -> Result<(), StoreError> {
        self.store.put(session_id, connection_handle).await?;
        tracing::info!(
            session_id = %session_id,
            connection_handle = %connection_handle,
            "Session registered"
        );
        Ok(())
    }

    pub async fn find_by_session_id(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(session_id).await
    }

    /// Batch resolution. Absent ids are silently omitted from the result;
    /// addressing a dead or unknown session is not an error.
    pub async fn find_by_session_ids(
        &self,
        session_ids: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        self.store.batch_get(session_ids).await
    }

    pub async fn find_session_id_by_connection_handle(
        &self,
        connection_handle: &str,
    ) -> Result<Option<String>, StoreError> {
        self.store.get_by_handle(connection_handle).await
    }

    /// Idempotent; deleting a non-existent id is not an error.
    pub async fn delete_by_session_id(&self, session_id: &str) -> Result<(), StoreError> {
        self.store.delete_by_session(session_id).await?;
        tracing::debug!(session_id = %session_id, "Session record deleted");
        Ok(())
    }

    /// Idempotent; used for broadcast-time eviction of stale handles.
    pub async fn delete_by_connection_handle(
        &self,
        connection_handle: &str,
    ) -> Result<(), StoreError> {
        self.store.delete_by_handle(connection_handle).await?;
        tracing::debug!(connection_handle = %connection_handle, "Session record evicted");
        Ok(())
    }
}
