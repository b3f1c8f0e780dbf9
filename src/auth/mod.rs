mod secrets;
mod signature;

pub use secrets::{
    create_secret_provider, EnvSecretProvider, SecretFetchError, SecretProvider,
    StaticSecretProvider,
};
pub use signature::{sign_handshake, SignatureValidator, ValidationError};
