//! HTTP entry point for broadcast dispatch

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::RecipientFailure;
use crate::error::{AppError, Result};
use crate::server::AppState;

/// A list of session ids plus an opaque JSON payload delivered verbatim to
/// every resolved connection.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub sessions: Vec<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub requested: usize,
    pub resolved: usize,
    pub delivered: usize,
    pub evicted: usize,
    pub failed: Vec<RecipientFailure>,
    pub timestamp: DateTime<Utc>,
}

#[tracing::instrument(
    name = "http.broadcast",
    skip(state, request),
    fields(session_count = request.sessions.len())
)]
pub async fn broadcast_message(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>> {
    let payload = serde_json::to_vec(&request.payload)
        .map_err(|e| AppError::Validation(format!("Unserializable payload: {}", e)))?;

    let report = state
        .dispatcher
        .broadcast(&request.sessions, &payload)
        .await?;

    Ok(Json(BroadcastResponse {
        requested: report.requested,
        resolved: report.resolved,
        delivered: report.delivered,
        evicted: report.evicted,
        failed: report.failed,
        timestamp: Utc::now(),
    }))
}
