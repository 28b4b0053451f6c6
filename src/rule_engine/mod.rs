//! RuleEngine - count thresholds with per-rule cooldown
//!
//! ## Responsibilities
//!
//! - Hold the active rule set (copy-on-write, sourced from the AlertStore)
//! - Level-triggered evaluation: a rule above threshold fires once per
//!   cooldown window for as long as the breach lasts
//! - Per-rule last-fired bookkeeping
//!
//! Rules on the same category fire independently of each other.
//!
//! Every store read or write of the rule set runs under `sync` together with
//! the matching active-set update, so a refresh cannot overwrite a rule
//! created or deleted while it was reading.

mod service;
mod types;

pub use service::RuleService;
pub use types::*;

use crate::alert_store::AlertStore;
use crate::detection::CategoryCounts;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Default minimum interval between alerts for one rule
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// RuleEngine instance
pub struct RuleEngine {
    rules: RwLock<Arc<Vec<Rule>>>,
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
    cooldown: chrono::Duration,
    sync: Mutex<()>,
}

impl RuleEngine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            last_fired: Mutex::new(HashMap::new()),
            cooldown: chrono::Duration::from_std(cooldown)
                .unwrap_or_else(|_| chrono::Duration::seconds(5)),
            sync: Mutex::new(()),
        }
    }

    /// Held across a store mutation and the matching `add_rule` / `remove_rule`
    pub(crate) async fn lock_sync(&self) -> MutexGuard<'_, ()> {
        self.sync.lock().await
    }

    /// Current active set
    pub async fn active_rules(&self) -> Arc<Vec<Rule>> {
        self.rules.read().await.clone()
    }

    /// Replace the whole active set; inactive rules are dropped
    pub async fn replace_rules(&self, rules: Vec<Rule>) {
        let active: Vec<Rule> = rules.into_iter().filter(|r| r.is_active).collect();
        {
            let mut last_fired = self.last_fired.lock().await;
            last_fired.retain(|id, _| active.iter().any(|r| &r.rule_id == id));
        }
        *self.rules.write().await = Arc::new(active);
    }

    pub async fn add_rule(&self, rule: Rule) {
        if !rule.is_active {
            return;
        }
        let mut rules = self.rules.write().await;
        let mut next: Vec<Rule> = rules
            .iter()
            .filter(|r| r.rule_id != rule.rule_id)
            .cloned()
            .collect();
        next.insert(0, rule);
        *rules = Arc::new(next);
    }

    /// Returns true if the rule was in the active set
    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let removed = {
            let mut rules = self.rules.write().await;
            let before = rules.len();
            let next: Vec<Rule> = rules
                .iter()
                .filter(|r| r.rule_id != rule_id)
                .cloned()
                .collect();
            let removed = next.len() != before;
            *rules = Arc::new(next);
            removed
        };
        self.last_fired.lock().await.remove(rule_id);
        removed
    }

    /// Reload the active set from the store
    pub async fn refresh(&self, store: &dyn AlertStore) -> Result<usize> {
        let _sync = self.sync.lock().await;
        let rules = store.list_active_rules().await?;
        let count = rules.len();
        self.replace_rules(rules).await;
        tracing::debug!(rule_count = count, "Rule set refreshed");
        Ok(count)
    }

    /// Alerts for every active rule whose count exceeds its threshold and whose
    /// cooldown has elapsed at `now`
    pub async fn evaluate(&self, counts: &CategoryCounts, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let rules = self.active_rules().await;
        let mut last_fired = self.last_fired.lock().await;
        let mut events = Vec::new();

        for rule in rules.iter() {
            let count = counts.get(rule.category);
            if (count as i64) <= rule.threshold as i64 {
                continue;
            }
            if let Some(last) = last_fired.get(&rule.rule_id) {
                if now - *last < self.cooldown {
                    continue;
                }
            }
            last_fired.insert(rule.rule_id.clone(), now);
            events.push(AlertEvent::new(rule, count, now));
        }

        events
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Category;

    fn rule(id: &str, category: Category, threshold: i32) -> Rule {
        Rule {
            rule_id: id.to_string(),
            name: format!("rule-{}", id),
            category,
            threshold,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn counts(person: usize, vehicle: usize) -> CategoryCounts {
        let mut c = CategoryCounts::zeroed();
        c.set(Category::Person, person);
        c.set(Category::Vehicle, vehicle);
        c
    }

    #[tokio::test]
    async fn test_fires_once_when_count_crosses_zero_threshold() {
        let engine = RuleEngine::default();
        engine.replace_rules(vec![rule("1", Category::Person, 0)]).await;

        let now = Utc::now();
        assert!(engine.evaluate(&counts(0, 0), now).await.is_empty());

        let events = engine.evaluate(&counts(1, 0), now).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rule_name, "rule-1");
        assert_eq!(events[0].category, Category::Person);
        assert_eq!(events[0].category.as_str(), "person");
        assert_eq!(events[0].count, 1);
    }

    #[tokio::test]
    async fn test_sustained_breach_respects_cooldown() {
        let engine = RuleEngine::new(Duration::from_secs(5));
        engine.replace_rules(vec![rule("1", Category::Person, 0)]).await;

        let start = Utc::now();
        let mut fired = 0;
        // 12 simulated seconds at 10 evaluations per second
        for step in 0..120 {
            let now = start + chrono::Duration::milliseconds(step * 100);
            fired += engine.evaluate(&counts(3, 0), now).await.len();
        }
        assert!((2..=3).contains(&fired), "fired {} times", fired);
    }

    #[tokio::test]
    async fn test_level_triggered_without_dip() {
        let engine = RuleEngine::new(Duration::from_secs(5));
        engine.replace_rules(vec![rule("1", Category::Vehicle, 1)]).await;

        let t0 = Utc::now();
        assert_eq!(engine.evaluate(&counts(0, 2), t0).await.len(), 1);
        assert!(engine
            .evaluate(&counts(0, 2), t0 + chrono::Duration::seconds(4))
            .await
            .is_empty());
        assert_eq!(
            engine
                .evaluate(&counts(0, 2), t0 + chrono::Duration::seconds(5))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_rules_on_same_category_fire_independently() {
        let engine = RuleEngine::default();
        engine
            .replace_rules(vec![
                rule("low", Category::Person, 0),
                rule("high", Category::Person, 2),
            ])
            .await;

        let t0 = Utc::now();
        let events = engine.evaluate(&counts(1, 0), t0).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rule_id, "low");

        // "low" is cooling down, "high" has never fired
        let events = engine
            .evaluate(&counts(3, 0), t0 + chrono::Duration::seconds(1))
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rule_id, "high");
    }

    #[tokio::test]
    async fn test_remove_rule_stops_alerts() {
        let engine = RuleEngine::default();
        engine.add_rule(rule("1", Category::Person, 0)).await;
        assert_eq!(engine.active_rules().await.len(), 1);

        assert!(engine.remove_rule("1").await);
        assert!(!engine.remove_rule("1").await);
        assert!(engine.evaluate(&counts(5, 0), Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_drops_inactive() {
        let engine = RuleEngine::default();
        let mut inactive = rule("2", Category::Person, 0);
        inactive.is_active = false;
        engine
            .replace_rules(vec![rule("1", Category::Person, 0), inactive])
            .await;
        let rules = engine.active_rules().await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_id, "1");
    }

    #[tokio::test]
    async fn test_snapshot_of_rules_unaffected_by_later_writes() {
        let engine = RuleEngine::default();
        engine.add_rule(rule("1", Category::Person, 0)).await;
        let before = engine.active_rules().await;
        engine.add_rule(rule("2", Category::Animal, 0)).await;
        assert_eq!(before.len(), 1);
        assert_eq!(engine.active_rules().await.len(), 2);
    }
}
