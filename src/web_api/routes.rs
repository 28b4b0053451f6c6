//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::alert_store::AlertSettingsRequest;
use crate::detection::Category;
use crate::error::{Error, Result};
use crate::frame_source::{open_source, test_connection, SourceConfig};
use crate::models::{ApiResponse, DetectionsResponse};
use crate::rule_engine::CreateRuleRequest;
use crate::state::AppState;

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ALERT_LIMIT: usize = 20;
const MAX_ALERT_LIMIT: usize = 500;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Camera
        .route("/api/camera/configure", post(configure_camera))
        .route("/api/camera/test", post(test_camera))
        // Stream lifecycle
        .route("/api/stream/start", post(start_stream))
        .route("/api/stream/stop", post(stop_stream))
        .route("/api/detections", get(get_detections))
        // Rules
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/:id", delete(delete_rule))
        // Alerts
        .route("/api/alerts", get(list_alerts))
        .route("/api/alert-settings", post(configure_alerts))
        .route("/api/alert-settings/test", post(send_test_email))
        // WebSocket
        .route("/api/ws", get(super::ws::websocket_handler))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

async fn configure_camera(
    State(state): State<AppState>,
    Json(config): Json<SourceConfig>,
) -> Result<impl IntoResponse> {
    config.validate()?;
    *state.camera.write().await = config.clone();
    tracing::info!(source_type = ?config.source_type, "Camera configured");
    Ok(Json(ApiResponse::success(config)))
}

/// Test the given camera, or the configured one when no body is sent
async fn test_camera(
    State(state): State<AppState>,
    body: Option<Json<SourceConfig>>,
) -> Result<impl IntoResponse> {
    let config = match body {
        Some(Json(c)) => c,
        None => state.camera.read().await.clone(),
    };
    let report = test_connection(
        &config,
        state.config.frame_width,
        state.config.frame_height,
        CONNECTION_TEST_TIMEOUT,
    )
    .await?;
    Ok(Json(ApiResponse::success(report)))
}

// ========================================
// Stream Handlers
// ========================================

async fn start_stream(State(state): State<AppState>) -> Result<impl IntoResponse> {
    if state.stream.is_running().await {
        return Err(Error::Conflict("stream already running".to_string()));
    }
    let config = state.camera.read().await.clone();
    let source = open_source(&config, state.config.frame_width, state.config.frame_height).await?;
    state.stream.start(source).await?;
    Ok(Json(json!({"ok": true, "status": "started"})))
}

async fn stop_stream(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.stream.stop().await;
    Json(json!({"ok": true, "status": outcome}))
}

async fn get_detections(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.stream.snapshot().await;
    Json(DetectionsResponse {
        streaming: state.stream.is_running().await,
        snapshot: (*snapshot).clone(),
    })
}

// ========================================
// Rule Handlers
// ========================================

async fn list_rules(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let rules = state.rules.list_rules().await?;
    Ok(Json(ApiResponse::success(rules)))
}

async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse> {
    let rule = state.rules.create_rule(&req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(rule))))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.rules.delete_rule(&id).await?;
    Ok(Json(json!({"ok": true})))
}

// ========================================
// Alert Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<impl IntoResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ALERT_LIMIT)
        .clamp(1, MAX_ALERT_LIMIT);
    let alerts = state.store.list_recent_alerts(limit).await?;
    Ok(Json(ApiResponse::success(alerts)))
}

async fn configure_alerts(
    State(state): State<AppState>,
    Json(req): Json<AlertSettingsRequest>,
) -> Result<impl IntoResponse> {
    let emails = req.validate()?;
    let added = state.store.add_recipients(&emails).await?;
    tracing::info!(added = added, submitted = emails.len(), "Alert recipients updated");
    Ok(Json(json!({"ok": true, "added": added, "emails": emails})))
}

/// Sends a sample alert to the active recipients
async fn send_test_email(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let mut recipients = state.store.list_active_recipient_emails().await?;
    if recipients.is_empty() {
        recipients = state.config.alert_recipients.clone();
    }
    if recipients.is_empty() {
        return Err(Error::Validation("no alert recipients configured".to_string()));
    }

    state
        .notifier
        .send_alert_email("Test Alert", Category::Person, 1, &recipients)
        .await?;
    Ok(Json(json!({"ok": true, "recipients": recipients.len()})))
}
