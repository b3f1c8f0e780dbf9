//! Transport collaborator: "send bytes to a live connection handle"
//!
//! The dispatcher only depends on the [`ConnectionTransport`] trait;
//! [`LocalTransport`] is the in-process implementation backed by the
//! per-socket outbound channels owned by the WebSocket handler.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Delivery outcome for a single recipient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection no longer exists at the transport layer. Safe to evict
    /// the registry record.
    #[error("Connection is gone")]
    Gone,

    /// Ambiguous delivery failure; the connection may still be live, so the
    /// registry record is left alone.
    #[error("Delivery failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ConnectionTransport: Send + Sync {
    async fn send(&self, connection_handle: &str, payload: &[u8]) -> Result<(), SendError>;
}

/// Routes payloads to locally attached WebSocket connections.
///
/// Sends are non-blocking: a full outbound buffer is reported as a failure
/// instead of stalling the rest of a broadcast behind one slow reader.
#[derive(Default)]
pub struct LocalTransport {
    senders: DashMap<String, mpsc::Sender<Vec<u8>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the outbound channel for a freshly issued connection handle.
    /// Called before admission completes so no delivery window is missed.
    pub fn attach(&self, connection_handle: &str, sender: mpsc::Sender<Vec<u8>>) {
        self.senders.insert(connection_handle.to_string(), sender);
    }

    pub fn detach(&self, connection_handle: &str) {
        self.senders.remove(connection_handle);
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }
}

#[async_trait]
impl ConnectionTransport for LocalTransport {
    async fn send(&self, connection_handle: &str, payload: &[u8]) -> Result<(), SendError> {
        let sender = match self.senders.get(connection_handle) {
            Some(sender) => sender.clone(),
            None => return Err(SendError::Gone),
        };

        match sender.try_send(payload.to_vec()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // The socket task detaches on exit, but a connection whose
                // upgrade never completed has no task to do so; prune the
                // dead sender here so the map cannot accumulate zombies.
                self.senders
                    .remove_if(connection_handle, |_, s| s.same_channel(&sender));
                Err(SendError::Gone)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(SendError::Failed("outbound buffer full".to_string()))
            }
        }
    }
}
