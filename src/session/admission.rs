use std::sync::Arc;

use thiserror::Error;

use crate::auth::{SignatureValidator, ValidationError};
use crate::registry::ConnectionRegistry;

/// Handshake metadata forwarded by the transport layer. All three fields are
/// required; any missing one rejects the attempt before validation runs.
#[derive(Debug, Default, Clone)]
pub struct HandshakeMeta {
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

/// Terminal outcome of a failed connection attempt. No retries happen inside
/// the flow; the client reconnects with a fresh credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Missing required handshake headers")]
    MissingHeaders,

    #[error("Expired or invalid timestamp")]
    ExpiredOrInvalidTimestamp,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signing secret unavailable: {0}")]
    SecretUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for AdmissionError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::ExpiredOrInvalidTimestamp => AdmissionError::ExpiredOrInvalidTimestamp,
            ValidationError::InvalidSignature => AdmissionError::InvalidSignature,
            ValidationError::SecretUnavailable(msg) => AdmissionError::SecretUnavailable(msg),
        }
    }
}

/// Accepts or rejects one connection attempt: header check, credential
/// verification, then registry write.
pub struct AdmissionFlow {
    validator: Arc<SignatureValidator>,
    registry: ConnectionRegistry,
}

impl AdmissionFlow {
    pub fn new(validator: Arc<SignatureValidator>, registry: ConnectionRegistry) -> Self {
        Self {
            validator,
            registry,
        }
    }

    /// Returns the admitted session id on success, after the registry records
    /// `session_id -> connection_handle`.
    #[tracing::instrument(name = "session.admit", skip(self, meta))]
    pub async fn admit(
        &self,
        meta: &HandshakeMeta,
        connection_handle: &str,
    ) -> Result<String, AdmissionError> {
        let (session_id, timestamp, signature) =
            match (&meta.session_id, &meta.timestamp, &meta.signature) {
                (Some(s), Some(t), Some(sig)) => (s, t, sig),
                _ => {
                    tracing::warn!("Missing one or more required handshake headers");
                    return Err(AdmissionError::MissingHeaders);
                }
            };

        self.validator
            .validate(session_id, timestamp, signature)
            .await?;

        self.registry
            .put(session_id, connection_handle)
            .await
            .map_err(|e| {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to record admitted session"
                );
                AdmissionError::Internal(e.to_string())
            })?;

        tracing::info!(
            session_id = %session_id,
            connection_handle = %connection_handle,
            "Session authorized and connection stored"
        );
        Ok(session_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{sign_handshake, StaticSecretProvider};
    use crate::registry::{MemorySessionStore, SessionStore, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    const SECRET: &str = "admission-test-secret";

    fn flow_with_store(store: Arc<dyn SessionStore>) -> AdmissionFlow {
        let validator = Arc::new(SignatureValidator::new(
            Arc::new(StaticSecretProvider::new(SECRET)),
            5,
        ));
        AdmissionFlow::new(validator, ConnectionRegistry::new(store))
    }

    fn valid_meta(session_id: &str) -> HandshakeMeta {
        let timestamp = Utc::now().to_rfc3339();
        let signature = sign_handshake(SECRET, session_id, &timestamp);
        HandshakeMeta {
            session_id: Some(session_id.to_string()),
            timestamp: Some(timestamp),
            signature: Some(signature),
        }
    }

    #[tokio::test]
    async fn test_valid_handshake_records_session() {
        let store = Arc::new(MemorySessionStore::new());
        let flow = flow_with_store(store.clone());

        let admitted = flow.admit(&valid_meta("s1"), "conn-1").await.unwrap();
        assert_eq!(admitted, "s1");
        assert_eq!(store.get("s1").await.unwrap(), Some("conn-1".to_string()));
    }

    #[tokio::test]
    async fn test_missing_headers_rejected_before_validation() {
        let flow = flow_with_store(Arc::new(MemorySessionStore::new()));
        let mut meta = valid_meta("s1");
        meta.signature = None;
        assert_eq!(
            flow.admit(&meta, "conn-1").await,
            Err(AdmissionError::MissingHeaders)
        );
    }

    #[tokio::test]
    async fn test_validator_rejection_propagates() {
        let flow = flow_with_store(Arc::new(MemorySessionStore::new()));
        let mut meta = valid_meta("s1");
        meta.signature = Some("deadbeef".to_string());
        assert_eq!(
            flow.admit(&meta, "conn-1").await,
            Err(AdmissionError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn test_readmission_overwrites_handle() {
        let store = Arc::new(MemorySessionStore::new());
        let flow = flow_with_store(store.clone());

        flow.admit(&valid_meta("s1"), "conn-old").await.unwrap();
        flow.admit(&valid_meta("s1"), "conn-new").await.unwrap();

        assert_eq!(store.get("s1").await.unwrap(), Some("conn-new".to_string()));
        assert_eq!(store.get_by_handle("conn-old").await.unwrap(), None);
        assert_eq!(
            store.get_by_handle("conn-new").await.unwrap(),
            Some("s1".to_string())
        );
    }

    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        async fn put(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("store down".to_string()))
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("store down".to_string()))
        }
        async fn batch_get(&self, _: &[String]) -> Result<HashMap<String, String>, StoreError> {
            Err(StoreError::Unavailable("store down".to_string()))
        }
        async fn get_by_handle(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("store down".to_string()))
        }
        async fn delete_by_session(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("store down".to_string()))
        }
        async fn delete_by_handle(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("store down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_registry_failure_is_internal() {
        let flow = flow_with_store(Arc::new(DownStore));
        let result = flow.admit(&valid_meta("s1"), "conn-1").await;
        assert!(matches!(result, Err(AdmissionError::Internal(_))));
    }
}
