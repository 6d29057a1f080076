//! GET /health

use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::types::HealthResponse;

/// Health check with session and provider counts.
pub async fn health(State(state): State<Arc<crate::AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        sessions: state.store.active_count(),
        invalidated: state.store.invalidated_count(),
        providers: state.dispatcher.registry().len(),
    })
}
