//! Service endpoints outside the resource routes

use super::models::HealthResponse;
use super::routes::AppState;
use axum::{Json, extract::State, http::StatusCode};

/// GET /health - Liveness check
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}
