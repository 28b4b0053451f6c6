//! Detector label → category table
//!
//! Entries are matched in order as case-insensitive substrings, so the first
//! matching pattern wins. Labels matching nothing are ignored.

use super::types::{Category, Detection, RawDetection};
use crate::error::{Error, Result};

/// One pattern entry
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRule {
    pub pattern: String,
    pub category: Category,
}

/// Configurable label table
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    rules: Vec<LabelRule>,
}

impl LabelMap {
    pub fn new(rules: Vec<LabelRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| LabelRule {
                pattern: r.pattern.to_ascii_lowercase(),
                category: r.category,
            })
            .collect();
        Self { rules }
    }

    /// Parse `pattern=category` pairs separated by commas,
    /// e.g. `person=person,dog=animal,truck=vehicle`
    pub fn parse(raw: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (pattern, category) = entry.split_once('=').ok_or_else(|| {
                Error::Config(format!("label map entry '{}' is not pattern=category", entry))
            })?;
            let pattern = pattern.trim();
            if pattern.is_empty() {
                return Err(Error::Config(format!("empty pattern in '{}'", entry)));
            }
            let category = category
                .parse::<Category>()
                .map_err(|e| Error::Config(e.to_string()))?;
            rules.push(LabelRule {
                pattern: pattern.to_string(),
                category,
            });
        }
        if rules.is_empty() {
            return Err(Error::Config("label map is empty".to_string()));
        }
        Ok(Self::new(rules))
    }

    /// Category for a raw detector label
    pub fn categorize(&self, label: &str) -> Option<Category> {
        let label = label.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|r| label.contains(&r.pattern))
            .map(|r| r.category)
    }

    /// Map raw detections to categories, dropping unmapped labels, malformed
    /// boxes and anything under `min_confidence`
    pub fn classify(&self, raw: Vec<RawDetection>, min_confidence: f32) -> Vec<Detection> {
        raw.into_iter()
            .filter_map(|r| {
                if !r.bbox.is_well_formed() || !(0.0..=1.0).contains(&r.confidence) {
                    tracing::debug!(
                        label = %r.label,
                        bbox = ?r.bbox,
                        "Dropping malformed detection"
                    );
                    return None;
                }
                if r.confidence < min_confidence {
                    return None;
                }
                let category = self.categorize(&r.label)?;
                Some(Detection {
                    category,
                    bbox: r.bbox,
                    confidence: r.confidence,
                })
            })
            .collect()
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        let table: [(&str, Category); 15] = [
            ("person", Category::Person),
            ("human", Category::Person),
            ("dog", Category::Animal),
            ("cat", Category::Animal),
            ("animal", Category::Animal),
            ("bird", Category::Animal),
            ("horse", Category::Animal),
            ("sheep", Category::Animal),
            ("cow", Category::Animal),
            ("car", Category::Vehicle),
            ("truck", Category::Vehicle),
            ("bus", Category::Vehicle),
            ("motorcycle", Category::Vehicle),
            ("vehicle", Category::Vehicle),
            ("bicycle", Category::Vehicle),
        ];
        Self::new(
            table
                .iter()
                .map(|(p, c)| LabelRule {
                    pattern: p.to_string(),
                    category: *c,
                })
                .collect(),
        )
    }
}
