//! Broadcast dispatch: resolve session ids, deliver, evict stale handles

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::registry::{ConnectionRegistry, StoreError};
use crate::transport::{ConnectionTransport, SendError};

/// Maximum number of concurrent delivery attempts within one broadcast
const MAX_CONCURRENT_SENDS: usize = 100;

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The recipient set was empty; nothing was resolved or sent.
    #[error("No recipient sessions provided")]
    NoRecipients,

    /// Batch resolution failed; the whole broadcast aborts. Per-recipient
    /// delivery failures never surface here.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientFailure {
    pub session_id: String,
    pub error: String,
}

/// Per-broadcast outcome. `requested` counts distinct ids addressed;
/// ids without a registry record are neither delivered, evicted, nor failed.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub requested: usize,
    pub resolved: usize,
    pub delivered: usize,
    pub evicted: usize,
    pub failed: Vec<RecipientFailure>,
}

impl DispatchReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Cumulative dispatcher counters
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub total_broadcasts: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_evicted: AtomicU64,
    pub total_failed: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_broadcasts: self.total_broadcasts.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_broadcasts: u64,
    pub total_delivered: u64,
    pub total_evicted: u64,
    pub total_failed: u64,
}

enum Outcome {
    Delivered,
    Evicted,
    Failed { session_id: String, error: String },
}

/// Resolves a batch of session ids and delivers one payload to each live
/// connection, isolating per-recipient failures and evicting records whose
/// handle the transport reports gone.
pub struct BroadcastDispatcher {
    registry: ConnectionRegistry,
    transport: Arc<dyn ConnectionTransport>,
    stats: DispatcherStats,
}

impl BroadcastDispatcher {
    pub fn new(registry: ConnectionRegistry, transport: Arc<dyn ConnectionTransport>) -> Self {
        Self {
            registry,
            transport,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    #[tracing::instrument(
        name = "dispatch.broadcast",
        skip(self, session_ids, payload),
        fields(requested = session_ids.len(), payload_bytes = payload.len())
    )]
    pub async fn broadcast(
        &self,
        session_ids: &[String],
        payload: &[u8],
    ) -> Result<DispatchReport, DispatchError> {
        if session_ids.is_empty() {
            return Err(DispatchError::NoRecipients);
        }

        let unique: Vec<String> = session_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let resolved = self.registry.find_by_session_ids(&unique).await?;
        let resolved_count = resolved.len();
        tracing::debug!(
            requested = unique.len(),
            resolved = resolved_count,
            "Resolved broadcast recipients"
        );

        // Share one payload buffer across all delivery futures
        let payload: Arc<[u8]> = Arc::from(payload);

        let mut futures = FuturesUnordered::new();
        let mut delivered = 0usize;
        let mut evicted = 0usize;
        let mut failed = Vec::new();
        let mut pending = 0usize;

        let mut record = |outcome: Outcome| match outcome {
            Outcome::Delivered => delivered += 1,
            Outcome::Evicted => evicted += 1,
            Outcome::Failed { session_id, error } => {
                failed.push(RecipientFailure { session_id, error })
            }
        };

        for (session_id, handle) in resolved {
            futures.push(self.deliver_one(session_id, handle, payload.clone()));
            pending += 1;

            while pending >= MAX_CONCURRENT_SENDS {
                if let Some(outcome) = futures.next().await {
                    pending -= 1;
                    record(outcome);
                } else {
                    break;
                }
            }
        }

        while let Some(outcome) = futures.next().await {
            record(outcome);
        }

        self.stats.total_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_evicted
            .fetch_add(evicted as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed.len() as u64, Ordering::Relaxed);

        tracing::info!(
            requested = unique.len(),
            resolved = resolved_count,
            delivered = delivered,
            evicted = evicted,
            failed = failed.len(),
            "Broadcast complete"
        );

        Ok(DispatchReport {
            requested: unique.len(),
            resolved: resolved_count,
            delivered,
            evicted,
            failed,
        })
    }

    async fn deliver_one(
        &self,
        session_id: String,
        connection_handle: String,
        payload: Arc<[u8]>,
    ) -> Outcome {
        match self.transport.send(&connection_handle, &payload).await {
            Ok(()) => Outcome::Delivered,
            Err(SendError::Gone) => {
                tracing::warn!(
                    session_id = %session_id,
                    connection_handle = %connection_handle,
                    "Stale connection, evicting registry record"
                );
                if let Err(e) = self
                    .registry
                    .delete_by_connection_handle(&connection_handle)
                    .await
                {
                    // The record stays until the next broadcast or disconnect
                    // retries the eviction.
                    tracing::warn!(
                        connection_handle = %connection_handle,
                        error = %e,
                        "Failed to evict stale session record"
                    );
                }
                Outcome::Evicted
            }
            Err(SendError::Failed(error)) => {
                tracing::error!(
                    session_id = %session_id,
                    connection_handle = %connection_handle,
                    error = %error,
                    "Delivery failed"
                );
                Outcome::Failed { session_id, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemorySessionStore, SessionStore};
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::collections::HashMap;

    /// Scripted transport: handles not listed in `outcomes` report `Gone`.
    #[derive(Default)]
    struct FakeTransport {
        outcomes: DashMap<String, Result<(), SendError>>,
        sent: DashMap<String, Vec<u8>>,
        send_count: AtomicU64,
    }

    impl FakeTransport {
        fn live(&self, handle: &str) {
            self.outcomes.insert(handle.to_string(), Ok(()));
        }

        fn failing(&self, handle: &str, error: &str) {
            self.outcomes.insert(
                handle.to_string(),
                Err(SendError::Failed(error.to_string())),
            );
        }
    }

    #[async_trait]
    impl ConnectionTransport for FakeTransport {
        async fn send(&self, connection_handle: &str, payload: &[u8]) -> Result<(), SendError> {
            self.send_count.fetch_add(1, Ordering::Relaxed);
            match self.outcomes.get(connection_handle) {
                Some(outcome) => {
                    if outcome.value().is_ok() {
                        self.sent
                            .insert(connection_handle.to_string(), payload.to_vec());
                    }
                    outcome.value().clone()
                }
                None => Err(SendError::Gone),
            }
        }
    }

    /// Store wrapper that counts calls, to assert fail-fast behavior.
    struct CountingStore {
        inner: MemorySessionStore,
        calls: AtomicU64,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemorySessionStore::new(),
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionStore for CountingStore {
        async fn put(&self, s: &str, c: &str) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.put(s, c).await
        }
        async fn get(&self, s: &str) -> Result<Option<String>, StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.get(s).await
        }
        async fn batch_get(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.batch_get(ids).await
        }
        async fn get_by_handle(&self, h: &str) -> Result<Option<String>, StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.get_by_handle(h).await
        }
        async fn delete_by_session(&self, s: &str) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.delete_by_session(s).await
        }
        async fn delete_by_handle(&self, h: &str) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.delete_by_handle(h).await
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_mixed_live_unknown_stale_recipients() {
        let store = Arc::new(MemorySessionStore::new());
        store.put("live", "c-live").await.unwrap();
        store.put("stale", "c-stale").await.unwrap();

        let transport = Arc::new(FakeTransport::default());
        transport.live("c-live");
        // c-stale has no scripted outcome -> Gone

        let dispatcher =
            BroadcastDispatcher::new(ConnectionRegistry::new(store.clone()), transport.clone());
        let report = dispatcher
            .broadcast(&ids(&["live", "unknown", "stale"]), b"payload")
            .await
            .unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.failed_count(), 0);

        // Stale record was self-healed away; the live one survives
        assert_eq!(store.get("stale").await.unwrap(), None);
        assert_eq!(store.get("live").await.unwrap(), Some("c-live".to_string()));
        assert_eq!(
            transport.sent.get("c-live").unwrap().clone(),
            b"payload".to_vec()
        );
    }

    #[tokio::test]
    async fn test_empty_recipient_set_touches_nothing() {
        let store = Arc::new(CountingStore::new());
        let transport = Arc::new(FakeTransport::default());
        let dispatcher =
            BroadcastDispatcher::new(ConnectionRegistry::new(store.clone()), transport.clone());

        let result = dispatcher.broadcast(&[], b"payload").await;
        assert!(matches!(result, Err(DispatchError::NoRecipients)));
        assert_eq!(store.calls.load(Ordering::Relaxed), 0);
        assert_eq!(transport.send_count.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_one_failure_never_blocks_other_recipients() {
        let store = Arc::new(MemorySessionStore::new());
        store.put("a", "c-a").await.unwrap();
        store.put("b", "c-b").await.unwrap();
        store.put("c", "c-c").await.unwrap();

        let transport = Arc::new(FakeTransport::default());
        transport.live("c-a");
        transport.failing("c-b", "socket buffer full");
        transport.live("c-c");

        let dispatcher =
            BroadcastDispatcher::new(ConnectionRegistry::new(store.clone()), transport);
        let report = dispatcher
            .broadcast(&ids(&["a", "b", "c"]), b"x")
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].session_id, "b");
        // Ambiguous failure must not evict
        assert_eq!(store.get("b").await.unwrap(), Some("c-b".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_dispatched_once() {
        let store = Arc::new(MemorySessionStore::new());
        store.put("s1", "c1").await.unwrap();

        let transport = Arc::new(FakeTransport::default());
        transport.live("c1");

        let dispatcher =
            BroadcastDispatcher::new(ConnectionRegistry::new(store), transport.clone());
        let report = dispatcher
            .broadcast(&ids(&["s1", "s1", "s1"]), b"x")
            .await
            .unwrap();

        assert_eq!(report.requested, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(transport.send_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let store = Arc::new(MemorySessionStore::new());
        store.put("s1", "c1").await.unwrap();

        let transport = Arc::new(FakeTransport::default());
        transport.live("c1");

        let dispatcher =
            BroadcastDispatcher::new(ConnectionRegistry::new(store), transport);
        dispatcher.broadcast(&ids(&["s1"]), b"x").await.unwrap();
        dispatcher.broadcast(&ids(&["s1"]), b"y").await.unwrap();

        let stats = dispatcher.stats();
        assert_eq!(stats.total_broadcasts, 2);
        assert_eq!(stats.total_delivered, 2);
        assert_eq!(stats.total_failed, 0);
    }
}
