//! Per-frame loop body
//!
//! detect → categorize → track → snapshot → rules → dispatch → publish → log

use super::snapshot::{DetectionSnapshot, SnapshotStore};
use super::{StreamConfig, TerminationReason};
use crate::alert_dispatcher::AlertDispatcher;
use crate::alert_store::DetectionLogEntry;
use crate::annotator::annotate_and_encode;
use crate::category_aggregator::CategoryAggregator;
use crate::detection::{group_by_category, Detection, Detector, LabelMap};
use crate::frame_source::{Frame, FrameSource};
use crate::realtime_hub::{BroadcastHub, FramePayload, HubMessage};
use crate::rule_engine::RuleEngine;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

pub(super) struct FramePipeline {
    pub detector: Arc<dyn Detector>,
    pub label_map: Arc<LabelMap>,
    pub rules: Arc<RuleEngine>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub hub: Arc<BroadcastHub>,
    pub snapshot: Arc<SnapshotStore>,
    pub config: StreamConfig,
    pub aggregator: CategoryAggregator,
}

impl FramePipeline {
    /// Runs until stopped or the source ends. `first` is processed before
    /// anything else is read.
    pub async fn run(
        mut self,
        mut source: Box<dyn FrameSource>,
        first: Frame,
        mut stop_rx: watch::Receiver<bool>,
    ) -> TerminationReason {
        let described = source.describe();
        let mut pending = Some(first);

        loop {
            if *stop_rx.borrow() {
                return TerminationReason::Stopped;
            }

            let frame = match pending.take() {
                Some(f) => f,
                None => tokio::select! {
                    _ = stop_rx.changed() => return TerminationReason::Stopped,
                    next = source.next_frame() => match next {
                        Ok(Some(f)) => f,
                        Ok(None) => {
                            tracing::warn!(source = %described, "Frame source ended");
                            return TerminationReason::SourceEnded;
                        }
                        Err(e) => {
                            tracing::error!(source = %described, error = %e, "Frame source failed");
                            return TerminationReason::SourceEnded;
                        }
                    },
                },
            };

            self.process(frame).await;

            tokio::select! {
                _ = stop_rx.changed() => return TerminationReason::Stopped,
                _ = tokio::time::sleep(self.config.pace) => {}
            }
        }
    }

    async fn process(&mut self, frame: Frame) {
        let raw = match self.detector.detect(&frame).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Detection failed, skipping frame");
                return;
            }
        };

        let detections = self.label_map.classify(raw, self.config.min_confidence);
        let counts = self.aggregator.update(&group_by_category(&detections));
        let frame_no = self.aggregator.frame_count();

        self.snapshot
            .replace(Arc::new(DetectionSnapshot {
                frame: frame_no,
                timestamp: Utc::now(),
                counts: counts.clone(),
            }))
            .await;

        for event in self.rules.evaluate(&counts, Utc::now()).await {
            self.dispatcher.dispatch(&event).await;
        }

        if every(frame_no, self.config.publish_every) && self.hub.subscriber_count().await > 0 {
            self.publish_frame(frame, detections).await;
        }

        if every(frame_no, self.config.detection_log_every) && counts.total() > 0 {
            tracing::info!(frame = frame_no, counts = ?counts, "Detection log");
            self.dispatcher.record_detection_log(DetectionLogEntry {
                logged_at: Utc::now(),
                frame: frame_no,
                counts,
            });
        }
    }

    async fn publish_frame(&self, frame: Frame, detections: Vec<Detection>) {
        let encoded = tokio::task::spawn_blocking(move || {
            annotate_and_encode(&frame.image, &detections, frame.captured_at)
        })
        .await;

        let image = match encoded {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Frame annotation failed");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame annotation task failed");
                return;
            }
        };

        let snapshot = self.snapshot.current().await;
        self.hub
            .publish(&HubMessage::Frame(FramePayload {
                image,
                detections: (*snapshot).clone(),
            }))
            .await;
    }
}

fn every(frame_no: u64, n: u64) -> bool {
    n > 0 && frame_no % n == 0
}

#[cfg(test)]
mod tests {
    use super::every;

    #[test]
    fn test_every() {
        assert!(!every(1, 3));
        assert!(every(3, 3));
        assert!(every(6, 3));
        assert!(!every(5, 0));
    }
}
