//! Detection types shared by the tracker, rule engine and hub

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Object category tracked by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Person,
    Animal,
    Vehicle,
}

impl Category {
    /// Every category, in tracker order
    pub const ALL: [Category; 3] = [Category::Person, Category::Animal, Category::Vehicle];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Person => "person",
            Category::Animal => "animal",
            Category::Vehicle => "vehicle",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" => Ok(Category::Person),
            "animal" => Ok(Category::Animal),
            "vehicle" => Ok(Category::Vehicle),
            other => Err(crate::Error::Validation(format!(
                "unknown category '{}' (expected person, animal or vehicle)",
                other
            ))),
        }
    }
}

/// Axis-aligned bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Geometric midpoint
    pub fn centroid(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Finite coordinates with x1 < x2 and y1 < y2
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Detector output before label mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    #[serde(flatten)]
    pub bbox: BBox,
    #[serde(alias = "conf")]
    pub confidence: f32,
}

/// Categorized detection, consumed by the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub category: Category,
    pub bbox: BBox,
    pub confidence: f32,
}

/// Per-category tracked-object counts
///
/// Always contains an entry for every category in [`Category::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryCounts(BTreeMap<Category, usize>);

impl CategoryCounts {
    pub fn zeroed() -> Self {
        Self(Category::ALL.iter().map(|c| (*c, 0)).collect())
    }

    pub fn get(&self, category: Category) -> usize {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn set(&mut self, category: Category, count: usize) {
        self.0.insert(category, count);
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        self.0.iter().map(|(c, n)| (*c, *n))
    }
}

impl Default for CategoryCounts {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("Person".parse::<Category>().unwrap(), Category::Person);
        assert_eq!(" vehicle ".parse::<Category>().unwrap(), Category::Vehicle);
        assert!("plant".parse::<Category>().is_err());
    }

    #[test]
    fn test_bbox_well_formed() {
        assert!(BBox::new(10.0, 10.0, 50.0, 50.0).is_well_formed());
        assert!(!BBox::new(50.0, 10.0, 10.0, 50.0).is_well_formed());
        assert!(!BBox::new(10.0, 10.0, 10.0, 50.0).is_well_formed());
        assert!(!BBox::new(f32::NAN, 10.0, 20.0, 50.0).is_well_formed());
    }

    #[test]
    fn test_counts_serialize_as_map() {
        let mut counts = CategoryCounts::zeroed();
        counts.set(Category::Person, 2);
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json["person"], 2);
        assert_eq!(json["animal"], 0);
        assert_eq!(json["vehicle"], 0);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_raw_detection_accepts_conf_alias() {
        let raw: RawDetection = serde_json::from_str(
            r#"{"label":"dog","x1":1.0,"y1":2.0,"x2":3.0,"y2":4.0,"conf":0.9}"#,
        )
        .unwrap();
        assert_eq!(raw.label, "dog");
        assert_eq!(raw.bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
        assert!((raw.confidence - 0.9).abs() < 1e-6);
    }
}
