//! HTTP report surface
//!
//! Serves the latest tick report to downstream consumers (dashboards,
//! probes). The scheduler publishes reports into a watch channel; handlers
//! only ever read the most recent one.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::contracts::{HealthStatus, TickReport};

/// Application state
pub struct AppState {
    latest: watch::Receiver<Option<TickReport>>,
}

impl AppState {
    pub fn new(latest: watch::Receiver<Option<TickReport>>) -> Self {
        Self { latest }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/api/v1/health/report", get(latest_report))
        .route("/api/v1/health/status", get(global_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe for the agent process itself
async fn liveness() -> impl IntoResponse {
    Json(LivenessResponse {
        status: "ok".to_string(),
        agent: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Full latest tick report
async fn latest_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TickReport>, (StatusCode, Json<ApiError>)> {
    match state.latest.borrow().clone() {
        Some(report) => Ok(Json(report)),
        None => Err(no_tick_yet()),
    }
}

/// Just the folded global status
async fn global_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ApiError>)> {
    match state.latest.borrow().clone() {
        Some(report) => Ok(Json(StatusResponse {
            global: report.global,
            tick_id: report.tick_id.to_string(),
            tick_at: report.tick_at.to_rfc3339(),
        })),
        None => Err(no_tick_yet()),
    }
}

fn no_tick_yet() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiError {
            error: "NoTickYet".to_string(),
            message: "no evaluation tick has completed yet".to_string(),
        }),
    )
}

/// Liveness response
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub agent: String,
    pub version: String,
}

/// Reduced status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub global: HealthStatus,
    pub tick_id: String,
    pub tick_at: String,
}

/// API error body
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}
