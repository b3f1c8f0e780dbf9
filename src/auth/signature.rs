//! Handshake signature verification
//!
//! A client signs `"{session_id}:{timestamp}"` with HMAC-SHA-256 under the
//! shared secret and presents the lowercase-hex digest at connect time. The
//! timestamp bounds replay exposure without a nonce store.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::auth::secrets::SecretProvider;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Expired or invalid timestamp")]
    ExpiredOrInvalidTimestamp,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signing secret unavailable: {0}")]
    SecretUnavailable(String),
}

pub struct SignatureValidator {
    secret_provider: Arc<dyn SecretProvider>,
    skew_tolerance: chrono::Duration,
}

impl SignatureValidator {
    pub fn new(secret_provider: Arc<dyn SecretProvider>, skew_tolerance_minutes: i64) -> Self {
        Self {
            secret_provider,
            skew_tolerance: chrono::Duration::minutes(skew_tolerance_minutes),
        }
    }

    /// Verify a handshake credential. The secret is fetched fresh on every
    /// call; see `auth::secrets`.
    #[tracing::instrument(name = "auth.validate", skip(self, signature))]
    pub async fn validate(
        &self,
        session_id: &str,
        timestamp: &str,
        signature: &str,
    ) -> Result<(), ValidationError> {
        let request_time = parse_timestamp(timestamp).ok_or_else(|| {
            tracing::warn!(timestamp = %timestamp, "Unparseable handshake timestamp");
            ValidationError::ExpiredOrInvalidTimestamp
        })?;

        let skew = Utc::now().signed_duration_since(request_time).abs();
        if skew > self.skew_tolerance {
            tracing::warn!(
                session_id = %session_id,
                skew_seconds = skew.num_seconds(),
                "Handshake timestamp outside acceptable range"
            );
            return Err(ValidationError::ExpiredOrInvalidTimestamp);
        }

        let secret = self
            .secret_provider
            .current_secret()
            .await
            .map_err(|e| ValidationError::SecretUnavailable(e.0))?;

        let supplied = hex::decode(signature).map_err(|_| ValidationError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ValidationError::SecretUnavailable(e.to_string()))?;
        mac.update(session_id.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());

        // verify_slice is constant-time
        mac.verify_slice(&supplied).map_err(|_| {
            tracing::warn!(session_id = %session_id, "Invalid handshake signature");
            ValidationError::InvalidSignature
        })
    }
}

/// Accepts RFC 3339 (with offset or `Z`) and naive ISO-8601 interpreted as UTC.
fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Client-side helper: compute the lowercase-hex credential for a handshake.
pub fn sign_handshake(secret: &str, session_id: &str, timestamp: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{}:{}", session_id, timestamp).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
