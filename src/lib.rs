//! RGB Detection Server Library
//!
//! Live detection, tracking and alerting for a single camera stream.
//!
//! ## Architecture
//!
//! 1. FrameSource - frame acquisition (ffmpeg pipe, image directory)
//! 2. Detection - detector seam + label → category mapping
//! 3. CentroidTracker - stable per-object ids within one category
//! 4. CategoryAggregator - one tracker per category, per-frame counts
//! 5. RuleEngine - count thresholds with per-rule cooldown
//! 6. AlertDispatcher - background persistence + email, live alert publish
//! 7. BroadcastHub - WebSocket fan-out
//! 8. StreamController - Idle / Running lifecycle and the frame loop
//! 9. AlertStore - MySQL or in-process persistence
//! 10. WebAPI - REST + WebSocket endpoints
//!
//! ## Frame path
//!
//! FrameSource → Detector → LabelMap → CategoryAggregator → SnapshotStore
//! → RuleEngine → AlertDispatcher / BroadcastHub

pub mod alert_dispatcher;
pub mod alert_store;
pub mod annotator;
pub mod category_aggregator;
pub mod centroid_tracker;
pub mod detection;
pub mod frame_source;
pub mod notifier;
pub mod realtime_hub;
pub mod rule_engine;
pub mod stream_controller;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
