use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shared_state::{UnifiedAppState, UsageStats};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub api_keys_available: usize,
    pub uptime_seconds: f64,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "API running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn health(State(state): State<UnifiedAppState>) -> Json<HealthResponse> {
    let shared = &state.shared_state;
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        api_keys_available: shared.config.openai_api_keys.len(),
        uptime_seconds: shared.uptime().as_secs_f64(),
    })
}

pub async fn stats(State(state): State<UnifiedAppState>) -> Json<UsageStats> {
    Json(state.shared_state.stats())
}
