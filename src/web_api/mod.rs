//! WebAPI - REST + WebSocket endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;
mod ws;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stream: state.stream.state().await,
        last_termination: state.stream.last_termination().await,
        snapshot: (*state.stream.snapshot().await).clone(),
        subscribers: state.hub.subscriber_count().await,
        dropped_jobs: state.dispatcher.dropped_jobs(),
    };

    Json(response)
}
