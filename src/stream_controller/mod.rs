//! StreamController - stream lifecycle
//!
//! ## Responsibilities
//!
//! - Idle / Running state machine (one active loop at a time)
//! - Opening check: a source that cannot deliver one frame never starts
//! - Graceful stop after the in-flight iteration
//! - Detection snapshot ownership
//!
//! ## Design
//!
//! `start` and `stop` are serialized by a lifecycle lock. The running loop
//! lives in a spawned task; source exhaustion ends the task and the controller
//! reports Idle without a `stop` call.

mod pipeline;
mod snapshot;

pub use snapshot::{DetectionSnapshot, SnapshotStore};

use crate::alert_dispatcher::AlertDispatcher;
use crate::alert_store::AlertStore;
use crate::category_aggregator::CategoryAggregator;
use crate::centroid_tracker::TrackerConfig;
use crate::detection::{Detector, LabelMap};
use crate::error::{Error, Result};
use crate::frame_source::FrameSource;
use crate::realtime_hub::BroadcastHub;
use crate::rule_engine::RuleEngine;
use pipeline::FramePipeline;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Stream loop tuning
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Publish an annotated frame every Nth processed frame (0 = never)
    pub publish_every: u64,
    /// Queue a detection log entry every Nth processed frame (0 = never)
    pub detection_log_every: u64,
    /// Sleep between iterations
    pub pace: Duration,
    pub min_confidence: f32,
    pub tracker: TrackerConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            publish_every: 3,
            detection_log_every: 30,
            pace: Duration::from_millis(10),
            min_confidence: 0.5,
            tracker: TrackerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Running,
}

/// Why the last run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Stopped,
    /// Source exhausted, disconnected or failed
    SourceEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

struct RunningStream {
    generation: u64,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<TerminationReason>,
}

/// StreamController instance
pub struct StreamController {
    detector: Arc<dyn Detector>,
    label_map: Arc<LabelMap>,
    rules: Arc<RuleEngine>,
    store: Arc<dyn AlertStore>,
    dispatcher: Arc<AlertDispatcher>,
    hub: Arc<BroadcastHub>,
    snapshot: Arc<SnapshotStore>,
    config: StreamConfig,
    lifecycle: Mutex<()>,
    running: Arc<Mutex<Option<RunningStream>>>,
    last_termination: Arc<RwLock<Option<TerminationReason>>>,
    generation: AtomicU64,
}

impl StreamController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detector: Arc<dyn Detector>,
        label_map: Arc<LabelMap>,
        rules: Arc<RuleEngine>,
        store: Arc<dyn AlertStore>,
        dispatcher: Arc<AlertDispatcher>,
        hub: Arc<BroadcastHub>,
        snapshot: Arc<SnapshotStore>,
        config: StreamConfig,
    ) -> Self {
        Self {
            detector,
            label_map,
            rules,
            store,
            dispatcher,
            hub,
            snapshot,
            config,
            lifecycle: Mutex::new(()),
            running: Arc::new(Mutex::new(None)),
            last_termination: Arc::new(RwLock::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Read one frame from `source`, then run the loop in the background
    ///
    /// Fails with `Conflict` while running and with `SourceUnavailable` if no
    /// frame could be read. Either way the state is unchanged.
    pub async fn start(&self, mut source: Box<dyn FrameSource>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.is_running().await {
            return Err(Error::Conflict("stream already running".to_string()));
        }

        let described = source.describe();
        let first = match source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(Error::SourceUnavailable(format!(
                    "{} produced no frames",
                    described
                )))
            }
            Err(Error::SourceUnavailable(msg)) => return Err(Error::SourceUnavailable(msg)),
            Err(e) => {
                return Err(Error::SourceUnavailable(format!("{}: {}", described, e)));
            }
        };

        match self.rules.refresh(self.store.as_ref()).await {
            Ok(n) => tracing::debug!(rules = n, "Active rules loaded"),
            Err(e) => tracing::warn!(error = %e, "Rule refresh failed, keeping current rule set"),
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (stop_tx, stop_rx) = watch::channel(false);
        let pipeline = FramePipeline {
            detector: self.detector.clone(),
            label_map: self.label_map.clone(),
            rules: self.rules.clone(),
            dispatcher: self.dispatcher.clone(),
            hub: self.hub.clone(),
            snapshot: self.snapshot.clone(),
            config: self.config.clone(),
            aggregator: CategoryAggregator::new(self.config.tracker),
        };

        let mut running = self.running.lock().await;
        let running_slot = self.running.clone();
        let last_termination = self.last_termination.clone();

        let handle = tokio::spawn(async move {
            let reason = pipeline.run(source, first, stop_rx).await;
            *last_termination.write().await = Some(reason);

            let mut slot = running_slot.lock().await;
            if slot.as_ref().map(|r| r.generation) == Some(generation) {
                *slot = None;
            }
            tracing::info!(generation, reason = ?reason, "Stream loop ended");
            reason
        });

        *running = Some(RunningStream {
            generation,
            stop_tx,
            handle,
        });

        tracing::info!(source = %described, generation, "Stream started");
        Ok(())
    }

    /// Signal the loop and wait for the in-flight iteration to finish
    pub async fn stop(&self) -> StopOutcome {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(run) = self.running.lock().await.take() else {
            return StopOutcome::AlreadyStopped;
        };

        let was_live = !run.handle.is_finished();
        let _ = run.stop_tx.send(true);

        match run.handle.await {
            Ok(reason) => {
                *self.last_termination.write().await = Some(reason);
            }
            Err(e) => {
                tracing::error!(error = %e, "Stream task panicked or was cancelled");
                *self.last_termination.write().await = Some(TerminationReason::Stopped);
            }
        }

        if was_live {
            tracing::info!(generation = run.generation, "Stream stopped");
            StopOutcome::Stopped
        } else {
            StopOutcome::AlreadyStopped
        }
    }

    pub async fn state(&self) -> StreamState {
        if self.is_running().await {
            StreamState::Running
        } else {
            StreamState::Idle
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn last_termination(&self) -> Option<TerminationReason> {
        *self.last_termination.read().await
    }

    pub async fn snapshot(&self) -> Arc<DetectionSnapshot> {
        self.snapshot.current().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_dispatcher::DispatcherConfig;
    use crate::alert_store::MemoryStore;
    use crate::detection::RawDetection;
    use crate::frame_source::Frame;
    use crate::notifier::DisabledNotifier;
    use async_trait::async_trait;
    use image::RgbImage;

    struct FixedDetector;

    #[async_trait]
    impl Detector for FixedDetector {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<RawDetection>> {
            Ok(vec![RawDetection {
                label: "person".to_string(),
                bbox: [10.0, 10.0, 50.0, 50.0].into(),
                confidence: 0.9,
            }])
        }
    }

    /// Yields `remaining` frames, then ends; `None` means endless
    struct CountedSource {
        remaining: Option<usize>,
    }

    impl CountedSource {
        fn finite(n: usize) -> Box<dyn FrameSource> {
            Box::new(Self { remaining: Some(n) })
        }

        fn endless() -> Box<dyn FrameSource> {
            Box::new(Self { remaining: None })
        }
    }

    #[async_trait]
    impl FrameSource for CountedSource {
        async fn next_frame(&mut self) -> Result<Option<Frame>> {
            match self.remaining.as_mut() {
                Some(0) => return Ok(None),
                Some(n) => *n -= 1,
                None => {}
            }
            Ok(Some(Frame::new(RgbImage::new(64, 64))))
        }

        fn describe(&self) -> String {
            "counted".to_string()
        }
    }

    /// One frame, then blocks inside `next_frame` until dropped
    struct HangingSource {
        delivered: bool,
    }

    #[async_trait]
    impl FrameSource for HangingSource {
        async fn next_frame(&mut self) -> Result<Option<Frame>> {
            if !self.delivered {
                self.delivered = true;
                return Ok(Some(Frame::new(RgbImage::new(64, 64))));
            }
            std::future::pending().await
        }

        fn describe(&self) -> String {
            "hanging".to_string()
        }
    }

    fn controller() -> StreamController {
        let store: Arc<dyn AlertStore> = Arc::new(MemoryStore::default());
        let hub = Arc::new(BroadcastHub::new());
        let dispatcher = Arc::new(AlertDispatcher::spawn(
            store.clone(),
            Arc::new(DisabledNotifier),
            hub.clone(),
            DispatcherConfig::default(),
        ));
        StreamController::new(
            Arc::new(FixedDetector),
            Arc::new(LabelMap::default()),
            Arc::new(RuleEngine::default()),
            store,
            dispatcher,
            hub,
            Arc::new(SnapshotStore::new()),
            StreamConfig {
                pace: Duration::from_millis(1),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_start_stop_cycle() {
        let ctl = controller();
        assert_eq!(ctl.state().await, StreamState::Idle);
        assert_eq!(ctl.stop().await, StopOutcome::AlreadyStopped);

        ctl.start(CountedSource::endless()).await.unwrap();
        assert_eq!(ctl.state().await, StreamState::Running);

        let err = ctl.start(CountedSource::endless()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ctl.stop().await, StopOutcome::Stopped);
        assert_eq!(ctl.state().await, StreamState::Idle);
        assert_eq!(ctl.last_termination().await, Some(TerminationReason::Stopped));

        let snap = ctl.snapshot().await;
        assert!(snap.frame >= 1);
        assert_eq!(snap.counts.get(crate::detection::Category::Person), 1);
    }

    #[tokio::test]
    async fn test_empty_source_never_starts() {
        let ctl = controller();
        let err = ctl.start(CountedSource::finite(0)).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert_eq!(ctl.state().await, StreamState::Idle);
        assert_eq!(ctl.last_termination().await, None);
    }

    #[tokio::test]
    async fn test_exhausted_source_returns_to_idle() {
        let ctl = controller();
        ctl.start(CountedSource::finite(5)).await.unwrap();

        for _ in 0..200 {
            if ctl.state().await == StreamState::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ctl.state().await, StreamState::Idle);
        assert_eq!(ctl.last_termination().await, Some(TerminationReason::SourceEnded));
        assert_eq!(ctl.snapshot().await.frame, 5);

        // can start again after the source ended
        ctl.start(CountedSource::endless()).await.unwrap();
        assert_eq!(ctl.stop().await, StopOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_stop_interrupts_blocked_frame_read() {
        let ctl = controller();
        ctl.start(Box::new(HangingSource { delivered: false }))
            .await
            .unwrap();

        for _ in 0..200 {
            if ctl.snapshot().await.frame == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ctl.snapshot().await.frame, 1);
        assert_eq!(ctl.state().await, StreamState::Running);

        let outcome = tokio::time::timeout(Duration::from_secs(2), ctl.stop())
            .await
            .expect("stop waited on a blocked frame read");
        assert_eq!(outcome, StopOutcome::Stopped);
        assert_eq!(ctl.state().await, StreamState::Idle);
        assert_eq!(ctl.last_termination().await, Some(TerminationReason::Stopped));
    }
}
