//! In-process alert store (ring buffers)
//!
//! Used when no database is configured and in tests. Alerts and detection
//! logs are kept in bounded ring buffers; rules and recipients are unbounded.

use super::types::{AlertRecord, DetectionLogEntry};
use super::AlertStore;
use crate::error::Result;
use crate::rule_engine::{AlertEvent, Rule, ValidRule};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Bounded FIFO; oldest entries are evicted first
struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    fn latest(&self, count: usize) -> Vec<T> {
        self.items.iter().rev().take(count).cloned().collect()
    }
}

struct Recipient {
    email: String,
    is_active: bool,
}

struct MemoryState {
    rules: Vec<Rule>,
    alerts: RingBuffer<AlertRecord>,
    detection_logs: RingBuffer<DetectionLogEntry>,
    recipients: Vec<Recipient>,
}

/// MemoryStore instance
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                rules: Vec::new(),
                alerts: RingBuffer::new(capacity),
                detection_logs: RingBuffer::new(capacity),
                recipients: Vec::new(),
            }),
        }
    }

    /// Latest detection log entries, newest first
    pub async fn recent_detection_logs(&self, count: usize) -> Vec<DetectionLogEntry> {
        self.state.read().await.detection_logs.latest(count)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(2000)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, event: &AlertEvent) -> Result<()> {
        self.state.write().await.alerts.push(AlertRecord::from(event));
        Ok(())
    }

    async fn insert_detection_log(&self, entry: &DetectionLogEntry) -> Result<()> {
        self.state.write().await.detection_logs.push(entry.clone());
        Ok(())
    }

    async fn list_active_rules(&self) -> Result<Vec<Rule>> {
        let state = self.state.read().await;
        let mut rules: Vec<Rule> = state.rules.iter().filter(|r| r.is_active).cloned().collect();
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rules)
    }

    async fn list_active_recipient_emails(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .recipients
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.email.clone())
            .collect())
    }

    async fn create_rule(&self, rule: &ValidRule) -> Result<Rule> {
        let created = Rule {
            rule_id: Uuid::new_v4().to_string(),
            name: rule.name.clone(),
            category: rule.category,
            threshold: rule.threshold,
            is_active: true,
            created_at: Utc::now(),
        };
        self.state.write().await.rules.push(created.clone());
        Ok(created)
    }

    async fn deactivate_rule(&self, rule_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.rules.iter_mut().find(|r| r.rule_id == rule_id && r.is_active) {
            Some(rule) => {
                rule.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        Ok(self.state.read().await.alerts.latest(limit))
    }

    async fn add_recipients(&self, emails: &[String]) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut added = 0;
        for email in emails {
            let position = state
                .recipients
                .iter()
                .position(|r| r.email.eq_ignore_ascii_case(email));
            match position {
                Some(i) if state.recipients[i].is_active => {}
                Some(i) => {
                    state.recipients[i].is_active = true;
                    added += 1;
                }
                None => {
                    state.recipients.push(Recipient {
                        email: email.clone(),
                        is_active: true,
                    });
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}
