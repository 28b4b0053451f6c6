//! RGB Detection Server
//!
//! Main entry point.

use rgb_detection_server::{
    alert_store::{AlertStore, MemoryStore, MySqlStore},
    detection::{Detector, RemoteDetector},
    notifier::{DisabledNotifier, EmailNotifier, MailRelayNotifier},
    state::{AppConfig, AppState},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rgb_detection_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RGB Detection Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        database = config.database_url.is_some(),
        detector_url = %config.detector_url,
        mail_relay = config.mail_relay_url.is_some(),
        cooldown_sec = config.alert_cooldown.as_secs(),
        frame_width = config.frame_width,
        frame_height = config.frame_height,
        "Configuration loaded"
    );

    // Persistence
    let store: Arc<dyn AlertStore> = match &config.database_url {
        Some(url) => {
            let pool = MySqlPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await?;
            tracing::info!("Database connected");
            Arc::new(MySqlStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-process store (data is not persisted)");
            Arc::new(MemoryStore::default())
        }
    };

    // Detector
    let remote = RemoteDetector::new(config.detector_url.clone(), config.min_confidence)?;
    match remote.health_check().await {
        Ok(true) => tracing::info!("Detector reachable"),
        Ok(false) => tracing::warn!("Detector health check returned non-success"),
        Err(e) => tracing::warn!(error = %e, "Detector not reachable yet"),
    }
    let detector: Arc<dyn Detector> = Arc::new(remote);

    // Email
    let notifier: Arc<dyn EmailNotifier> = match &config.mail_relay_url {
        Some(url) => Arc::new(MailRelayNotifier::new(
            url.clone(),
            config.sender_email.clone(),
            config.camera_name.clone(),
        )?),
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, alert email disabled");
            Arc::new(DisabledNotifier)
        }
    };

    let state = AppState::build(config, store, detector, notifier)?;

    match state.rule_engine.refresh(state.store.as_ref()).await {
        Ok(n) => tracing::info!(rules = n, "Active rules loaded"),
        Err(e) => tracing::error!(error = %e, "Failed to load rules"),
    }

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
            shutdown_state.stream.stop().await;
        })
        .await?;

    Ok(())
}
