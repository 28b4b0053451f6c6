//! Detection - detector seam and label categorization
//!
//! ## Responsibilities
//!
//! - `Detector` trait for the opaque object-detection capability
//! - Raw label → category mapping via a configurable table
//! - Rejection of malformed boxes before they reach the trackers

mod label_map;
mod remote;
mod types;

pub use label_map::{LabelMap, LabelRule};
pub use remote::RemoteDetector;
pub use types::*;

use crate::error::Result;
use crate::frame_source::Frame;
use async_trait::async_trait;
use std::collections::HashMap;

/// Object detector
///
/// Called once per frame from the stream loop. A failure only drops that frame.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>>;
}

/// Group categorized detections into per-category box lists
pub fn group_by_category(detections: &[Detection]) -> HashMap<Category, Vec<BBox>> {
    let mut grouped: HashMap<Category, Vec<BBox>> = HashMap::new();
    for d in detections {
        grouped.entry(d.category).or_default().push(d.bbox);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_category() {
        let detections = vec![
            Detection {
                category: Category::Person,
                bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
                confidence: 0.9,
            },
            Detection {
                category: Category::Person,
                bbox: BBox::new(100.0, 0.0, 110.0, 10.0),
                confidence: 0.8,
            },
            Detection {
                category: Category::Vehicle,
                bbox: BBox::new(0.0, 50.0, 40.0, 80.0),
                confidence: 0.7,
            },
        ];
        let grouped = group_by_category(&detections);
        assert_eq!(grouped[&Category::Person].len(), 2);
        assert_eq!(grouped[&Category::Vehicle].len(), 1);
        assert!(!grouped.contains_key(&Category::Animal));
    }
}
