//! AlertStore - best-effort persistence seam
//!
//! ## Responsibilities
//!
//! - Alerts and periodic detection log entries
//! - Rule storage (soft-deactivation only)
//! - Alert recipient addresses
//!
//! Callers on the frame path never await these directly; the dispatcher
//! queues them for background workers.

mod memory;
mod mysql;
mod types;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;
pub use types::*;

use crate::error::Result;
use crate::rule_engine::{AlertEvent, Rule, ValidRule};
use async_trait::async_trait;

/// Persistence store
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_alert(&self, event: &AlertEvent) -> Result<()>;

    async fn insert_detection_log(&self, entry: &DetectionLogEntry) -> Result<()>;

    /// Active rules, newest first
    async fn list_active_rules(&self) -> Result<Vec<Rule>>;

    async fn list_active_recipient_emails(&self) -> Result<Vec<String>>;

    async fn create_rule(&self, rule: &ValidRule) -> Result<Rule>;

    /// Returns false when no active rule has this id
    async fn deactivate_rule(&self, rule_id: &str) -> Result<bool>;

    /// Most recent alerts, newest first
    async fn list_recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>>;

    /// Returns the number of addresses that were added or re-activated
    async fn add_recipients(&self, emails: &[String]) -> Result<usize>;
}
