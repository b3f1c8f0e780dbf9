// Infrastructure layer (shared components)
pub mod config;
pub mod error;

// Domain layer (business logic)
pub mod auth;
pub mod dispatch;
pub mod registry;
pub mod session;
pub mod transport;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;
