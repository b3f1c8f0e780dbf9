use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::broadcast::broadcast_message;
use super::health::{health, stats};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        // Messaging endpoints
        .nest(
            "/api/v1",
            Router::new().route("/messages/broadcast", post(broadcast_message)),
        )
}
