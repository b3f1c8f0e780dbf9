//! Signing-secret retrieval
//!
//! The validator fetches the secret fresh on every admission; nothing above
//! this trait caches it, so a rotated secret is honored on the next handshake.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AuthConfig, ConfigError};

#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch the current signing secret.
    async fn current_secret(&self) -> Result<String, SecretFetchError>;
}

/// Error from the secret backend. Surfaces as `SecretUnavailable` at
/// admission time.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Signing secret unavailable: {0}")]
pub struct SecretFetchError(pub String);

/// Re-reads the secret from an environment variable on every call.
pub struct EnvSecretProvider {
    var_name: String,
}

impl EnvSecretProvider {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn current_secret(&self) -> Result<String, SecretFetchError> {
        std::env::var(&self.var_name)
            .map_err(|_| SecretFetchError(format!("environment variable {} not set", self.var_name)))
    }
}

/// Fixed secret loaded at startup, for deployments without rotation.
pub struct StaticSecretProvider {
    secret: String,
}

impl StaticSecretProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn current_secret(&self) -> Result<String, SecretFetchError> {
        Ok(self.secret.clone())
    }
}

/// Build the secret provider selected by configuration. `secret_env` wins
/// over `signing_secret` so rotation-capable deployments stay rotation-capable.
pub fn create_secret_provider(config: &AuthConfig) -> Result<Arc<dyn SecretProvider>, ConfigError> {
    if let Some(ref var_name) = config.secret_env {
        return Ok(Arc::new(EnvSecretProvider::new(var_name.clone())));
    }
    if let Some(ref secret) = config.signing_secret {
        return Ok(Arc::new(StaticSecretProvider::new(secret.clone())));
    }
    Err(ConfigError::Message(
        "either auth.signing_secret or auth.secret_env must be set".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticSecretProvider::new("s3cret");
        assert_eq!(provider.current_secret().await.unwrap(), "s3cret");
    }

    #[tokio::test]
    async fn test_env_provider_missing_var() {
        let provider = EnvSecretProvider::new("BEACON_TEST_SECRET_DOES_NOT_EXIST");
        assert!(provider.current_secret().await.is_err());
    }

    #[test]
    fn test_factory_requires_a_source() {
        let config = AuthConfig::default();
        assert!(create_secret_provider(&config).is_err());

        let config = AuthConfig {
            signing_secret: Some("abc".to_string()),
            ..AuthConfig::default()
        };
        assert!(create_secret_provider(&config).is_ok());
    }
}
