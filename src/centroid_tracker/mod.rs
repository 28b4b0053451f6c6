//! CentroidTracker - identity continuity for one object category
//!
//! ## Matching
//!
//! Every (existing object, input centroid) pair within `max_distance` is a
//! candidate. Candidates are claimed greedily in ascending distance order,
//! ties broken by existing-object order then input order. This is not a
//! minimum-weight bipartite matching and can swap identities on crossing
//! trajectories; it keeps the behaviour of the deployed tracker.
//!
//! Ids come from a per-tracker counter and are never reused.

use crate::detection::BBox;
use serde::Serialize;
use std::collections::BTreeMap;

/// Tracked position (box midpoint)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub x: f32,
    pub y: f32,
}

impl Centroid {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Centroid) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<&BBox> for Centroid {
    fn from(bbox: &BBox) -> Self {
        let (x, y) = bbox.centroid();
        Self { x, y }
    }
}

/// Tracker thresholds
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Frames an object may go unmatched before it is dropped
    pub max_disappeared: u32,
    /// Gating distance between frames, in box coordinate units
    pub max_distance: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared: 30,
            max_distance: 50.0,
        }
    }
}

/// Object with a stable id
#[derive(Debug, Clone, Serialize)]
pub struct TrackedObject {
    pub id: u64,
    pub centroid: Centroid,
    pub disappeared_frames: u32,
    pub history: Vec<Centroid>,
}

/// Per-category centroid tracker
#[derive(Debug, Clone)]
pub struct CentroidTracker {
    config: TrackerConfig,
    next_id: u64,
    objects: BTreeMap<u64, TrackedObject>,
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            next_id: 0,
            objects: BTreeMap::new(),
        }
    }

    /// Feed one frame of boxes; returns the live id → centroid mapping
    pub fn update(&mut self, boxes: &[BBox]) -> BTreeMap<u64, Centroid> {
        if boxes.is_empty() {
            let ids: Vec<u64> = self.objects.keys().copied().collect();
            for id in ids {
                self.mark_disappeared(id);
            }
            return self.centroids();
        }

        let inputs: Vec<Centroid> = boxes.iter().map(Centroid::from).collect();

        if self.objects.is_empty() {
            for c in inputs {
                self.register(c);
            }
            return self.centroids();
        }

        let existing: Vec<(u64, Centroid)> = self
            .objects
            .values()
            .map(|o| (o.id, o.centroid))
            .collect();

        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for (row, (_, obj_c)) in existing.iter().enumerate() {
            for (col, in_c) in inputs.iter().enumerate() {
                let d = obj_c.distance(in_c);
                if d <= self.config.max_distance {
                    candidates.push((d, row, col));
                }
            }
        }
        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut used_rows = vec![false; existing.len()];
        let mut used_cols = vec![false; inputs.len()];

        for (_, row, col) in candidates {
            if used_rows[row] || used_cols[col] {
                continue;
            }
            let id = existing[row].0;
            if let Some(obj) = self.objects.get_mut(&id) {
                obj.centroid = inputs[col];
                obj.disappeared_frames = 0;
                obj.history.push(inputs[col]);
            }
            used_rows[row] = true;
            used_cols[col] = true;
        }

        for (col, c) in inputs.iter().enumerate() {
            if !used_cols[col] {
                self.register(*c);
            }
        }

        for (row, (id, _)) in existing.iter().enumerate() {
            if !used_rows[row] {
                self.mark_disappeared(*id);
            }
        }

        self.centroids()
    }

    /// Number of live identities
    pub fn count(&self) -> usize {
        self.objects.len()
    }

    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    pub fn centroids(&self) -> BTreeMap<u64, Centroid> {
        self.objects.iter().map(|(id, o)| (*id, o.centroid)).collect()
    }

    /// Drop every identity; the id counter keeps counting
    pub fn reset(&mut self) {
        self.objects.clear();
    }

    fn register(&mut self, centroid: Centroid) {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(
            id,
            TrackedObject {
                id,
                centroid,
                disappeared_frames: 0,
                history: vec![centroid],
            },
        );
    }

    fn mark_disappeared(&mut self, id: u64) {
        let expired = match self.objects.get_mut(&id) {
            Some(obj) => {
                obj.disappeared_frames += 1;
                obj.disappeared_frames > self.config.max_disappeared
            }
            None => false,
        };
        if expired {
            self.objects.remove(&id);
        }
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
