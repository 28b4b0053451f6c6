//! AlertDispatcher - alert fan-out off the frame path
//!
//! ## Responsibilities
//!
//! - Queue alert persistence and alert email for background workers
//! - Publish the alert to live subscribers
//! - Queue periodic detection log entries
//!
//! Nothing here waits on persistence or email. A full queue drops the job
//! with a warning.

mod queue;

pub use queue::BackgroundJob;

use crate::alert_store::{AlertStore, DetectionLogEntry};
use crate::notifier::EmailNotifier;
use crate::realtime_hub::{AlertPayload, BroadcastHub, HubMessage};
use crate::rule_engine::AlertEvent;
use queue::{spawn_workers, WorkerContext};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    /// Used when the store has no active recipients
    pub fallback_recipients: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
            fallback_recipients: Vec::new(),
        }
    }
}

/// AlertDispatcher instance
pub struct AlertDispatcher {
    queue: mpsc::Sender<BackgroundJob>,
    hub: Arc<BroadcastHub>,
    dropped: AtomicU64,
    _workers: Vec<JoinHandle<()>>,
}

impl AlertDispatcher {
    /// Start the worker pool; must be called inside a tokio runtime
    pub fn spawn(
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn EmailNotifier>,
        hub: Arc<BroadcastHub>,
        config: DispatcherConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let ctx = Arc::new(WorkerContext {
            store,
            notifier,
            fallback_recipients: config.fallback_recipients,
        });
        let workers = spawn_workers(rx, config.workers, ctx);

        tracing::info!(
            queue_capacity = config.queue_capacity,
            workers = workers.len(),
            "Alert dispatcher started"
        );

        Self {
            queue: tx,
            hub,
            dropped: AtomicU64::new(0),
            _workers: workers,
        }
    }

    /// Persist (queued), email (queued), then publish to subscribers
    pub async fn dispatch(&self, event: &AlertEvent) {
        tracing::info!(
            rule_id = %event.rule_id,
            rule_name = %event.rule_name,
            category = %event.category,
            count = event.count,
            "Alert triggered"
        );

        self.enqueue(BackgroundJob::PersistAlert(event.clone()));
        self.enqueue(BackgroundJob::SendAlertEmail(event.clone()));
        self.hub
            .publish(&HubMessage::Alert(AlertPayload::from(event)))
            .await;
    }

    pub fn record_detection_log(&self, entry: DetectionLogEntry) {
        self.enqueue(BackgroundJob::PersistDetectionLog(entry));
    }

    /// Returns false if the job was dropped
    pub fn enqueue(&self, job: BackgroundJob) -> bool {
        match self.queue.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(job = job.kind(), "Background queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(job = job.kind(), "Background queue closed, dropping job");
                false
            }
        }
    }

    /// Jobs dropped since start
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_store::MemoryStore;
    use crate::detection::{Category, CategoryCounts};
    use crate::error::Result;
    use crate::rule_engine::Rule;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl EmailNotifier for RecordingNotifier {
        async fn send_alert_email(
            &self,
            rule_name: &str,
            _category: Category,
            _count: usize,
            recipients: &[String],
        ) -> Result<()> {
            self.sent
                .lock()
                .await
                .push((rule_name.to_string(), recipients.to_vec()));
            Ok(())
        }
    }

    fn event() -> AlertEvent {
        let rule = Rule {
            rule_id: "r1".to_string(),
            name: "Gate".to_string(),
            category: Category::Person,
            threshold: 0,
            is_active: true,
            created_at: Utc::now(),
        };
        AlertEvent::new(&rule, 1, Utc::now())
    }

    async fn settle<F, Fut>(mut done: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if done().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("background work did not complete");
    }

    #[tokio::test]
    async fn test_dispatch_persists_emails_and_publishes() {
        let store = Arc::new(MemoryStore::default());
        store.add_recipients(&["ops@example.com".to_string()]).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = Arc::new(BroadcastHub::new());
        let (_id, mut rx) = hub.subscribe().await;

        let dispatcher = AlertDispatcher::spawn(
            store.clone(),
            notifier.clone(),
            hub.clone(),
            DispatcherConfig::default(),
        );
        dispatcher.dispatch(&event()).await;

        let msg = rx.try_recv().unwrap();
        assert!(msg.contains("\"type\":\"alert\""));
        assert!(msg.contains("Gate"));

        settle(|| {
            let store = store.clone();
            let notifier = notifier.clone();
            async move {
                store.list_recent_alerts(10).await.unwrap().len() == 1
                    && notifier.sent.lock().await.len() == 1
            }
        })
        .await;

        let sent = notifier.sent.lock().await;
        assert_eq!(sent[0].0, "Gate");
        assert_eq!(sent[0].1, vec!["ops@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_recipients_and_no_recipients() {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let hub = Arc::new(BroadcastHub::new());

        let fallback = AlertDispatcher::spawn(
            store.clone(),
            notifier.clone(),
            hub.clone(),
            DispatcherConfig {
                fallback_recipients: vec!["env@example.com".to_string()],
                ..Default::default()
            },
        );
        fallback.dispatch(&event()).await;
        settle(|| {
            let notifier = notifier.clone();
            async move { notifier.sent.lock().await.len() == 1 }
        })
        .await;
        assert_eq!(
            notifier.sent.lock().await[0].1,
            vec!["env@example.com".to_string()]
        );

        let silent_notifier = Arc::new(RecordingNotifier::default());
        let silent = AlertDispatcher::spawn(
            store.clone(),
            silent_notifier.clone(),
            hub,
            DispatcherConfig::default(),
        );
        silent.dispatch(&event()).await;
        settle(|| {
            let store = store.clone();
            async move { store.list_recent_alerts(10).await.unwrap().len() == 2 }
        })
        .await;
        assert!(silent_notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_detection_log_is_queued() {
        let store = Arc::new(MemoryStore::default());
        let dispatcher = AlertDispatcher::spawn(
            store.clone(),
            Arc::new(RecordingNotifier::default()),
            Arc::new(BroadcastHub::new()),
            DispatcherConfig::default(),
        );
        let mut counts = CategoryCounts::zeroed();
        counts.set(Category::Vehicle, 2);
        dispatcher.record_detection_log(DetectionLogEntry {
            logged_at: Utc::now(),
            frame: 30,
            counts,
        });

        settle(|| {
            let store = store.clone();
            async move { store.recent_detection_logs(5).await.len() == 1 }
        })
        .await;
        assert_eq!(dispatcher.dropped_jobs(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let dispatcher = AlertDispatcher {
            queue: tx,
            hub: Arc::new(BroadcastHub::new()),
            dropped: AtomicU64::new(0),
            _workers: Vec::new(),
        };

        assert!(dispatcher.enqueue(BackgroundJob::PersistAlert(event())));
        assert!(!dispatcher.enqueue(BackgroundJob::PersistAlert(event())));
        dispatcher.dispatch(&event()).await;
        assert_eq!(dispatcher.dropped_jobs(), 3);
    }
}
