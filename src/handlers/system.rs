use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::{db, error::{AppError, Result}, state::AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// Liveness probe that also pings PostgreSQL.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match db::ping(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse { status: "ok", database: "up" }),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "degraded", database: "down" }),
            )
        }
    }
}

#[derive(Serialize)]
pub struct InitDbResponse {
    pub success: bool,
}

/// Creates the schema on an empty database. Disabled in production.
pub async fn init_db(State(state): State<AppState>) -> Result<Json<InitDbResponse>> {
    if state.config.is_production {
        return Err(AppError::NotFound);
    }

    db::init_schema(&state.db).await?;
    Ok(Json(InitDbResponse { success: true }))
}
