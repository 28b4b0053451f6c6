//! CategoryAggregator - one tracker per category
//!
//! Drives every category tracker once per frame and reports tracked-identity
//! counts (smoothed over `max_disappeared`), not raw per-frame detections.

use crate::centroid_tracker::{CentroidTracker, TrackerConfig};
use crate::detection::{BBox, Category, CategoryCounts};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Frame number + counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatorStats {
    pub frame: u64,
    pub counts: CategoryCounts,
}

/// Multi-category tracker
#[derive(Debug, Clone)]
pub struct CategoryAggregator {
    trackers: BTreeMap<Category, CentroidTracker>,
    frame_count: u64,
}

impl CategoryAggregator {
    /// Tracker for every category in [`Category::ALL`]
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_categories(&Category::ALL, config)
    }

    pub fn with_categories(categories: &[Category], config: TrackerConfig) -> Self {
        Self {
            trackers: categories
                .iter()
                .map(|c| (*c, CentroidTracker::new(config)))
                .collect(),
            frame_count: 0,
        }
    }

    /// Feed one frame; categories missing from `detections` get an empty update
    pub fn update(&mut self, detections: &HashMap<Category, Vec<BBox>>) -> CategoryCounts {
        self.frame_count += 1;
        let mut counts = CategoryCounts::zeroed();
        for (category, tracker) in self.trackers.iter_mut() {
            let boxes = detections.get(category).map(Vec::as_slice).unwrap_or(&[]);
            tracker.update(boxes);
            counts.set(*category, tracker.count());
        }
        counts
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn counts(&self) -> CategoryCounts {
        let mut counts = CategoryCounts::zeroed();
        for (category, tracker) in &self.trackers {
            counts.set(*category, tracker.count());
        }
        counts
    }

    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            frame: self.frame_count,
            counts: self.counts(),
        }
    }

    pub fn tracker(&self, category: Category) -> Option<&CentroidTracker> {
        self.trackers.get(&category)
    }
}

impl Default for CategoryAggregator {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(entries: &[(Category, [f32; 4])]) -> HashMap<Category, Vec<BBox>> {
        let mut map: HashMap<Category, Vec<BBox>> = HashMap::new();
        for (c, b) in entries {
            map.entry(*c).or_default().push(BBox::from(*b));
        }
        map
    }

    #[test]
    fn test_counts_are_tracked_identities() {
        let mut agg = CategoryAggregator::default();

        let counts = agg.update(&frame(&[
            (Category::Person, [10.0, 10.0, 50.0, 50.0]),
            (Category::Vehicle, [200.0, 200.0, 300.0, 260.0]),
        ]));
        assert_eq!(counts.get(Category::Person), 1);
        assert_eq!(counts.get(Category::Vehicle), 1);
        assert_eq!(counts.get(Category::Animal), 0);

        // Detector misses everything for one frame; identities persist
        let counts = agg.update(&HashMap::new());
        assert_eq!(counts.get(Category::Person), 1);
        assert_eq!(counts.get(Category::Vehicle), 1);
        assert_eq!(agg.frame_count(), 2);
    }

    #[test]
    fn test_categories_are_independent() {
        let mut agg = CategoryAggregator::default();
        agg.update(&frame(&[(Category::Person, [0.0, 0.0, 10.0, 10.0])]));
        // Same spot, different category: a new animal, person untouched
        let counts = agg.update(&frame(&[(Category::Animal, [0.0, 0.0, 10.0, 10.0])]));
        assert_eq!(counts.get(Category::Person), 1);
        assert_eq!(counts.get(Category::Animal), 1);
        assert_eq!(
            agg.tracker(Category::Person)
                .unwrap()
                .get(0)
                .unwrap()
                .disappeared_frames,
            1
        );
    }

    #[test]
    fn test_stats() {
        let mut agg =
            CategoryAggregator::with_categories(&[Category::Person], TrackerConfig::default());
        agg.update(&frame(&[
            (Category::Person, [0.0, 0.0, 10.0, 10.0]),
            (Category::Person, [300.0, 0.0, 310.0, 10.0]),
        ]));
        let stats = agg.stats();
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.counts.get(Category::Person), 2);
        assert!(agg.tracker(Category::Vehicle).is_none());
    }
}
