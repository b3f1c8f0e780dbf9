use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{SessionStore, StoreError};

/// In-memory session store for single-node deployments and tests.
///
/// `sessions` is the authoritative record; `handle_index` is the secondary
/// index for reverse lookups. If a connection handle is ever shared across
/// sessions (transport misbehavior), the reverse lookup deterministically
/// resolves to the lexicographically smallest session id.
#[derive(Default)]
pub struct MemorySessionStore {
    /// session_id -> connection_handle
    sessions: DashMap<String, String>,
    /// connection_handle -> session ids referencing it
    handle_index: DashMap<String, BTreeSet<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unindex(&self, connection_handle: &str, session_id: &str) {
        if let Some(mut ids) = self.handle_index.get_mut(connection_handle) {
            ids.remove(session_id);
            if ids.is_empty() {
                drop(ids);
                self.handle_index.remove(connection_handle);
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session_id: &str, connection_handle: &str) -> Result<(), StoreError> {
        let old = self
            .sessions
            .insert(session_id.to_string(), connection_handle.to_string());

        if let Some(old_handle) = old {
            if old_handle != connection_handle {
                self.unindex(&old_handle, session_id);
            }
        }

        self.handle_index
            .entry(connection_handle.to_string())
            .or_default()
            .insert(session_id.to_string());

        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.sessions.get(session_id).map(|h| h.clone()))
    }

    async fn batch_get(
        &self,
        session_ids: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        let mut resolved = HashMap::new();
        for id in session_ids {
            if let Some(handle) = self.sessions.get(id) {
                resolved.insert(id.clone(), handle.clone());
            }
        }
        Ok(resolved)
    }

    async fn get_by_handle(&self, connection_handle: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .handle_index
            .get(connection_handle)
            .and_then(|ids| ids.first().cloned()))
    }

    async fn delete_by_session(&self, session_id: &str) -> Result<(), StoreError> {
        if let Some((_, handle)) = self.sessions.remove(session_id) {
            self.unindex(&handle, session_id);
        }
        Ok(())
    }

    async fn delete_by_handle(&self, connection_handle: &str) -> Result<(), StoreError> {
        if let Some((_, ids)) = self.handle_index.remove(connection_handle) {
            for session_id in ids {
                // Only drop the record if it still references this handle; a
                // re-admission may have moved the session to a new connection.
                self.sessions
                    .remove_if(&session_id, |_, handle| handle == connection_handle);
            }
        }
        Ok(())
    }
}
