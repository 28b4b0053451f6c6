//! BroadcastHub - live WebSocket fan-out
//!
//! ## Responsibilities
//!
//! - Subscriber registration / removal
//! - Frame payloads (annotated JPEG + current snapshot)
//! - Alert payloads
//!
//! Every subscriber owns a bounded channel. A subscriber whose channel is
//! closed or full is dropped on the next publish; the others are unaffected.

use crate::detection::Category;
use crate::rule_engine::AlertEvent;
use crate::stream_controller::DetectionSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    Frame(FramePayload),
    Alert(AlertPayload),
}

impl HubMessage {
    fn kind(&self) -> &'static str {
        match self {
            HubMessage::Frame(_) => "frame",
            HubMessage::Alert(_) => "alert",
        }
    }
}

/// Annotated frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePayload {
    /// Base64 JPEG
    pub image: String,
    pub detections: DetectionSnapshot,
}

/// Alert notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub rule_id: String,
    pub rule_name: String,
    pub category: Category,
    pub count: usize,
    pub threshold: i32,
    pub message: String,
    pub timestamp: String,
}

impl From<&AlertEvent> for AlertPayload {
    fn from(e: &AlertEvent) -> Self {
        Self {
            rule_id: e.rule_id.clone(),
            rule_name: e.rule_name.clone(),
            category: e.category,
            count: e.count,
            threshold: e.threshold,
            message: e.message.clone(),
            timestamp: e.timestamp.to_rfc3339(),
        }
    }
}

/// BroadcastHub instance
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<String>>>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.capacity);

        let total = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, tx);
            subscribers.len()
        };

        tracing::info!(subscriber_id = %id, subscribers = total, "Subscriber connected");
        (id, rx)
    }

    /// Idempotent; returns true if the subscriber was present
    pub async fn unsubscribe(&self, id: &Uuid) -> bool {
        let removed = self.subscribers.write().await.remove(id).is_some();
        if removed {
            tracing::info!(subscriber_id = %id, "Subscriber disconnected");
        }
        removed
    }

    /// Send to every subscriber; returns how many received it
    pub async fn publish(&self, message: &HubMessage) -> usize {
        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize hub message");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, tx) in subscribers.iter() {
                match tx.try_send(json.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!(subscriber_id = %id, error = %e, "Dropping subscriber");
                        failed.push(*id);
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &failed {
                subscribers.remove(id);
            }
        }

        tracing::trace!(
            message_type = message.kind(),
            delivered = delivered,
            dropped = failed.len(),
            "Published"
        );
        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
