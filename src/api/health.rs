use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::database;
use crate::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub garanti_mode: String,
    pub paytr_mode: String,
    /// `connected`, `unreachable` or `not_configured`
    pub database: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let database = match &state.db {
        Some(pool) => match database::health_check(pool).await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!("Database health check failed: {}", e);
                "unreachable"
            }
        },
        None => "not_configured",
    };

    let (status, code) = if database == "unreachable" {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("healthy", StatusCode::OK)
    };

    let response = HealthResponse {
        status: status.to_string(),
        version,
        environment: state.environment.clone(),
        garanti_mode: state.garanti.config().mode.to_string(),
        paytr_mode: state.paytr.config().mode.to_string(),
        database: database.to_string(),
    };

    (code, Json(response))
}
