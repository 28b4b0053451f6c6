//! Application state
//!
//! Holds all shared components and state

use crate::alert_dispatcher::{AlertDispatcher, DispatcherConfig};
use crate::alert_store::AlertStore;
use crate::centroid_tracker::TrackerConfig;
use crate::detection::{Detector, LabelMap};
use crate::error::Result;
use crate::frame_source::{SourceConfig, SourceType, DEFAULT_WEBCAM_DEVICE};
use crate::notifier::EmailNotifier;
use crate::realtime_hub::BroadcastHub;
use crate::rule_engine::{RuleEngine, RuleService};
use crate::stream_controller::{SnapshotStore, StreamConfig, StreamController};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// MySQL URL; in-process store when unset
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Initial camera; webcam when unset
    pub rtsp_url: Option<String>,
    /// Inference server base URL
    pub detector_url: String,
    /// Mail relay endpoint; email disabled when unset
    pub mail_relay_url: Option<String>,
    pub sender_email: String,
    /// Used when no recipients are stored
    pub alert_recipients: Vec<String>,
    /// Shown in alert emails
    pub camera_name: String,
    /// `pattern=category,...`; built-in table when unset
    pub label_map: Option<String>,
    pub alert_cooldown: Duration,
    pub max_disappeared: u32,
    pub max_distance: f32,
    pub min_confidence: f32,
    pub frame_publish_every: u64,
    pub detection_log_every: u64,
    pub frame_pace: Duration,
    pub frame_width: u32,
    pub frame_height: u32,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: env_opt("DATABASE_URL"),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8000),
            rtsp_url: env_opt("RTSP_URL"),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            mail_relay_url: env_opt("MAIL_RELAY_URL"),
            sender_email: std::env::var("SENDER_EMAIL")
                .unwrap_or_else(|_| "alerts@localhost".to_string()),
            alert_recipients: env_opt("ALERT_RECIPIENTS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            camera_name: std::env::var("CAMERA_NAME").unwrap_or_else(|_| "Camera 1".to_string()),
            label_map: env_opt("LABEL_MAP"),
            alert_cooldown: Duration::from_secs(env_parse("ALERT_COOLDOWN_SEC", 5)),
            max_disappeared: env_parse("MAX_DISAPPEARED", 30),
            max_distance: env_parse("MAX_DISTANCE", 50.0),
            min_confidence: env_parse("MIN_CONFIDENCE", 0.5),
            frame_publish_every: env_parse("FRAME_PUBLISH_EVERY", 3),
            detection_log_every: env_parse("DETECTION_LOG_EVERY", 30),
            frame_pace: Duration::from_millis(env_parse("FRAME_PACE_MS", 10)),
            frame_width: env_parse("FRAME_WIDTH", 640),
            frame_height: env_parse("FRAME_HEIGHT", 480),
        }
    }
}

impl AppConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            max_disappeared: self.max_disappeared,
            max_distance: self.max_distance,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            publish_every: self.frame_publish_every,
            detection_log_every: self.detection_log_every,
            pace: self.frame_pace,
            min_confidence: self.min_confidence,
            tracker: self.tracker_config(),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            fallback_recipients: self.alert_recipients.clone(),
            ..Default::default()
        }
    }

    pub fn build_label_map(&self) -> Result<LabelMap> {
        match &self.label_map {
            Some(raw) => LabelMap::parse(raw),
            None => Ok(LabelMap::default()),
        }
    }

    /// Camera used until one is configured through the API
    pub fn initial_source(&self) -> SourceConfig {
        match &self.rtsp_url {
            Some(url) => SourceConfig::rtsp(url.clone()),
            None => SourceConfig {
                source_type: SourceType::Webcam,
                rtsp_url: None,
                video_file: None,
                device: Some(DEFAULT_WEBCAM_DEVICE.to_string()),
                directory: None,
            },
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// AlertStore (MySQL or in-process)
    pub store: Arc<dyn AlertStore>,
    /// RuleEngine (active rules + cooldowns)
    pub rule_engine: Arc<RuleEngine>,
    /// RuleService (rule CRUD)
    pub rules: RuleService,
    /// BroadcastHub (WebSocket fan-out)
    pub hub: Arc<BroadcastHub>,
    /// AlertDispatcher (background persistence + email)
    pub dispatcher: Arc<AlertDispatcher>,
    /// EmailNotifier (mail relay or disabled)
    pub notifier: Arc<dyn EmailNotifier>,
    /// StreamController (Idle / Running)
    pub stream: Arc<StreamController>,
    /// Current camera configuration
    pub camera: Arc<RwLock<SourceConfig>>,
}

impl AppState {
    /// Wire every component; spawns the dispatcher workers
    pub fn build(
        config: AppConfig,
        store: Arc<dyn AlertStore>,
        detector: Arc<dyn Detector>,
        notifier: Arc<dyn EmailNotifier>,
    ) -> Result<Self> {
        let label_map = Arc::new(config.build_label_map()?);
        let rule_engine = Arc::new(RuleEngine::new(config.alert_cooldown));
        let rules = RuleService::new(store.clone(), rule_engine.clone());
        let hub = Arc::new(BroadcastHub::new());
        let dispatcher = Arc::new(AlertDispatcher::spawn(
            store.clone(),
            notifier.clone(),
            hub.clone(),
            config.dispatcher_config(),
        ));
        let stream = Arc::new(StreamController::new(
            detector,
            label_map,
            rule_engine.clone(),
            store.clone(),
            dispatcher.clone(),
            hub.clone(),
            Arc::new(SnapshotStore::new()),
            config.stream_config(),
        ));
        let camera = Arc::new(RwLock::new(config.initial_source()));

        Ok(Self {
            config,
            store,
            rule_engine,
            rules,
            hub,
            dispatcher,
            notifier,
            stream,
            camera,
        })
    }
}
