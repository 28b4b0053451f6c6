//! Alert store records

use crate::detection::{Category, CategoryCounts};
use crate::error::{Error, Result};
use crate::rule_engine::AlertEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted alert, as listed by "recent alerts"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub rule_id: String,
    pub rule_name: String,
    pub category: Category,
    pub count: i64,
    pub message: String,
}

impl From<&AlertEvent> for AlertRecord {
    fn from(e: &AlertEvent) -> Self {
        Self {
            timestamp: e.timestamp,
            rule_id: e.rule_id.clone(),
            rule_name: e.rule_name.clone(),
            category: e.category,
            count: e.count as i64,
            message: e.message.clone(),
        }
    }
}

/// Periodic count sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionLogEntry {
    pub logged_at: DateTime<Utc>,
    pub frame: u64,
    pub counts: CategoryCounts,
}

/// Add alert recipients request
#[derive(Debug, Clone, Deserialize)]
pub struct AlertSettingsRequest {
    pub emails: Vec<String>,
}

impl AlertSettingsRequest {
    /// Trimmed, de-duplicated addresses; rejects anything without a local part and domain
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        for raw in &self.emails {
            let email = raw.trim();
            let valid = match email.split_once('@') {
                Some((local, domain)) => {
                    !local.is_empty()
                        && domain.contains('.')
                        && !email.contains(char::is_whitespace)
                }
                None => false,
            };
            if !valid {
                return Err(Error::Validation(format!("invalid email address '{}'", raw)));
            }
            if !out.iter().any(|e| e.eq_ignore_ascii_case(email)) {
                out.push(email.to_string());
            }
        }
        if out.is_empty() {
            return Err(Error::Validation("no email addresses given".to_string()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_validation() {
        let req = AlertSettingsRequest {
            emails: vec![
                " ops@example.com".to_string(),
                "OPS@example.com".to_string(),
                "guard@site.org".to_string(),
            ],
        };
        assert_eq!(req.validate().unwrap(), vec!["ops@example.com", "guard@site.org"]);

        let bad = AlertSettingsRequest {
            emails: vec!["not-an-email".to_string()],
        };
        assert!(bad.validate().is_err());

        let empty = AlertSettingsRequest { emails: vec![] };
        assert!(empty.validate().is_err());
    }
}
