//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Root endpoint
pub async fn root() -> &'static str {
    "Organic Certification Platform API v1.0"
}

/// Health check endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match &state.db {
        Some(db) => match sqlx::query("SELECT 1").execute(db).await {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        None => "in-memory",
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status.to_string(),
    })
}
