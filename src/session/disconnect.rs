use thiserror::Error;

use crate::registry::ConnectionRegistry;

/// Cleanup failure during disconnect. Reported to the caller for logging but
/// never escalated; the connection is gone regardless of registry state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Disconnect cleanup failed: {0}")]
pub struct CleanupFailed(pub String);

/// Removes the session record when the transport reports a closed connection.
pub struct DisconnectFlow {
    registry: ConnectionRegistry,
}

impl DisconnectFlow {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Idempotent: a handle that was never admitted, or whose record was
    /// already evicted, is a successful no-op.
    #[tracing::instrument(name = "session.disconnect", skip(self))]
    pub async fn run(&self, connection_handle: &str) -> Result<(), CleanupFailed> {
        let session_id = self
            .registry
            .find_session_id_by_connection_handle(connection_handle)
            .await
            .map_err(|e| CleanupFailed(e.to_string()))?;

        let Some(session_id) = session_id else {
            tracing::debug!(
                connection_handle = %connection_handle,
                "No session record for disconnected handle"
            );
            return Ok(());
        };

        self.registry
            .delete_by_session_id(&session_id)
            .await
            .map_err(|e| CleanupFailed(e.to_string()))?;

        tracing::info!(
            session_id = %session_id,
            connection_handle = %connection_handle,
            "Session record removed on disconnect"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemorySessionStore;
    use crate::registry::SessionStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_disconnect_removes_record() {
        let store = Arc::new(MemorySessionStore::new());
        store.put("s1", "c1").await.unwrap();
        let flow = DisconnectFlow::new(ConnectionRegistry::new(store.clone()));

        flow.run("c1").await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let store = Arc::new(MemorySessionStore::new());
        store.put("s1", "c1").await.unwrap();
        let flow = DisconnectFlow::new(ConnectionRegistry::new(store.clone()));

        flow.run("c1").await.unwrap();
        flow.run("c1").await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), None);
        assert_eq!(store.get_by_handle("c1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_handle_is_a_noop() {
        let flow = DisconnectFlow::new(ConnectionRegistry::new(Arc::new(
            MemorySessionStore::new(),
        )));
        assert!(flow.run("never-admitted").await.is_ok());
    }
}
