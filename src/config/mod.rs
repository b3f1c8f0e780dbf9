mod settings;

pub use config::ConfigError;
pub use settings::{
    AuthConfig, ServerConfig, Settings, StoreBackend, StoreConfig, WebSocketConfig,
};
