//! Background job queue - bounded mpsc drained by a small worker pool
//!
//! Jobs run at most once. Failures are logged and dropped.

use crate::alert_store::{AlertStore, DetectionLogEntry};
use crate::notifier::EmailNotifier;
use crate::rule_engine::AlertEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Work taken off the frame loop
#[derive(Debug, Clone)]
pub enum BackgroundJob {
    PersistAlert(AlertEvent),
    SendAlertEmail(AlertEvent),
    PersistDetectionLog(DetectionLogEntry),
}

impl BackgroundJob {
    pub fn kind(&self) -> &'static str {
        match self {
            BackgroundJob::PersistAlert(_) => "persist_alert",
            BackgroundJob::SendAlertEmail(_) => "send_alert_email",
            BackgroundJob::PersistDetectionLog(_) => "persist_detection_log",
        }
    }
}

/// Shared by all workers
pub(crate) struct WorkerContext {
    pub store: Arc<dyn AlertStore>,
    pub notifier: Arc<dyn EmailNotifier>,
    pub fallback_recipients: Vec<String>,
}

impl WorkerContext {
    async fn run(&self, job: BackgroundJob) {
        match job {
            BackgroundJob::PersistAlert(event) => {
                if let Err(e) = self.store.insert_alert(&event).await {
                    tracing::warn!(rule_id = %event.rule_id, error = %e, "Failed to persist alert");
                }
            }
            BackgroundJob::SendAlertEmail(event) => {
                let recipients = self.recipients().await;
                if recipients.is_empty() {
                    tracing::debug!(
                        rule_id = %event.rule_id,
                        "No alert recipients configured, skipping email"
                    );
                    return;
                }
                if let Err(e) = self
                    .notifier
                    .send_alert_email(&event.rule_name, event.category, event.count, &recipients)
                    .await
                {
                    tracing::warn!(
                        rule_id = %event.rule_id,
                        error = %e,
                        "Failed to send alert email"
                    );
                }
            }
            BackgroundJob::PersistDetectionLog(entry) => {
                if let Err(e) = self.store.insert_detection_log(&entry).await {
                    tracing::warn!(
                        frame = entry.frame,
                        error = %e,
                        "Failed to persist detection log"
                    );
                }
            }
        }
    }

    /// Store recipients, or the configured list when the store has none
    async fn recipients(&self) -> Vec<String> {
        match self.store.list_active_recipient_emails().await {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => self.fallback_recipients.clone(),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to load alert recipients, using configured list"
                );
                self.fallback_recipients.clone()
            }
        }
    }
}

/// Spawn `workers` tasks sharing one receiver
pub(crate) fn spawn_workers(
    rx: mpsc::Receiver<BackgroundJob>,
    workers: usize,
    ctx: Arc<WorkerContext>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers.max(1))
        .map(|worker_id| {
            let rx = rx.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    tracing::trace!(worker_id, job = job.kind(), "Running background job");
                    ctx.run(job).await;
                }
                tracing::debug!(worker_id, "Background worker stopped");
            })
        })
        .collect()
}
