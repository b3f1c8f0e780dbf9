//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::StoreBackend;
use crate::dispatch::DispatcherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store_backend: String,
    pub local_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub local_connections: usize,
    pub dispatch: DispatcherStatsSnapshot,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = match state.settings.store.backend {
        StoreBackend::Memory => "memory",
        StoreBackend::Redis => "redis",
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store_backend: backend.to_string(),
        local_connections: state.transport.connection_count(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        local_connections: state.transport.connection_count(),
        dispatch: state.dispatcher.stats(),
    })
}
