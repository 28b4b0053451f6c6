//! Latest-counts snapshot, written once per processed frame

use crate::detection::CategoryCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Counts as of one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    pub frame: u64,
    pub timestamp: DateTime<Utc>,
    pub counts: CategoryCounts,
}

impl DetectionSnapshot {
    pub fn empty() -> Self {
        Self {
            frame: 0,
            timestamp: Utc::now(),
            counts: CategoryCounts::zeroed(),
        }
    }
}

/// Single writer (the frame loop), many readers
pub struct SnapshotStore {
    current: RwLock<Arc<DetectionSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(DetectionSnapshot::empty())),
        }
    }

    pub async fn replace(&self, snapshot: Arc<DetectionSnapshot>) {
        *self.current.write().await = snapshot;
    }

    pub async fn current(&self) -> Arc<DetectionSnapshot> {
        self.current.read().await.clone()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Category;

    fn uniform(frame: u64) -> Arc<DetectionSnapshot> {
        let mut counts = CategoryCounts::zeroed();
        for c in Category::ALL {
            counts.set(c, frame as usize);
        }
        Arc::new(DetectionSnapshot {
            frame,
            timestamp: Utc::now(),
            counts,
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_mixed_counts() {
        let store = Arc::new(SnapshotStore::new());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for frame in 1..=500 {
                    store.replace(uniform(frame)).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut last = 0;
                    for _ in 0..500 {
                        let snap = store.current().await;
                        let n = snap.frame as usize;
                        for (_, count) in snap.counts.iter() {
                            assert_eq!(count, n);
                        }
                        assert!(snap.frame >= last);
                        last = snap.frame;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
        assert_eq!(store.current().await.frame, 500);
    }
}
