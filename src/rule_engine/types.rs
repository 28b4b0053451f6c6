//! Rule engine types

use crate::detection::Category;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_RULE_NAME_LEN: usize = 255;

/// Count threshold rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub name: String,
    pub category: Category,
    /// Fires when the tracked count is strictly greater than this
    pub threshold: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Create rule request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(alias = "object_type")]
    pub category: String,
    pub threshold: i32,
}

impl CreateRuleRequest {
    /// Reject malformed rules before they reach the store or the engine
    pub fn validate(&self) -> Result<ValidRule> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("rule name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_RULE_NAME_LEN {
            return Err(Error::Validation(format!(
                "rule name exceeds {} characters",
                MAX_RULE_NAME_LEN
            )));
        }
        let category: Category = self.category.parse()?;
        if self.threshold < 0 {
            return Err(Error::Validation(format!(
                "threshold must be >= 0 (got {})",
                self.threshold
            )));
        }
        Ok(ValidRule {
            name: name.to_string(),
            category,
            threshold: self.threshold,
        })
    }
}

/// Validated rule fields, ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRule {
    pub name: String,
    pub category: Category,
    pub threshold: i32,
}

/// One threshold breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_id: String,
    pub rule_name: String,
    pub category: Category,
    pub count: usize,
    pub threshold: i32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(rule: &Rule, count: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            rule_id: rule.rule_id.clone(),
            rule_name: rule.name.clone(),
            category: rule.category,
            count,
            threshold: rule.threshold,
            message: format!(
                "Alert: {} - {} count ({}) exceeded threshold ({})",
                rule.name, rule.category, count, rule.threshold
            ),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, category: &str, threshold: i32) -> CreateRuleRequest {
        CreateRuleRequest {
            name: name.to_string(),
            category: category.to_string(),
            threshold,
        }
    }

    #[test]
    fn test_validate_ok() {
        let valid = request("  Lobby crowd ", "Person", 3).validate().unwrap();
        assert_eq!(valid.name, "Lobby crowd");
        assert_eq!(valid.category, Category::Person);
        assert_eq!(valid.threshold, 3);
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(request("", "person", 1).validate().is_err());
        assert!(request("x", "plant", 1).validate().is_err());
        assert!(request("x", "person", -1).validate().is_err());
        assert!(request(&"n".repeat(300), "person", 1).validate().is_err());
    }

    #[test]
    fn test_request_accepts_object_type() {
        let body = r#"{"name":"Cars","object_type":"vehicle","threshold":2}"#;
        let req: CreateRuleRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.category, "vehicle");
    }

    #[test]
    fn test_alert_message() {
        let rule = Rule {
            rule_id: "r1".to_string(),
            name: "Gate".to_string(),
            category: Category::Animal,
            threshold: 0,
            is_active: true,
            created_at: Utc::now(),
        };
        let event = AlertEvent::new(&rule, 2, Utc::now());
        assert_eq!(
            event.message,
            "Alert: Gate - animal count (2) exceeded threshold (0)"
        );
    }
}
