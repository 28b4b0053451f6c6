//! RuleService - rule CRUD through the store, kept in step with the engine

use super::types::{CreateRuleRequest, Rule};
use super::RuleEngine;
use crate::alert_store::AlertStore;
use crate::error::{Error, Result};
use std::sync::Arc;

/// RuleService instance
#[derive(Clone)]
pub struct RuleService {
    store: Arc<dyn AlertStore>,
    engine: Arc<RuleEngine>,
}

impl RuleService {
    pub fn new(store: Arc<dyn AlertStore>, engine: Arc<RuleEngine>) -> Self {
        Self { store, engine }
    }

    /// Validate, persist, then add to the active set
    pub async fn create_rule(&self, req: &CreateRuleRequest) -> Result<Rule> {
        let valid = req.validate()?;
        let rule = {
            let _sync = self.engine.lock_sync().await;
            let rule = self.store.create_rule(&valid).await?;
            self.engine.add_rule(rule.clone()).await;
            rule
        };

        tracing::info!(
            rule_id = %rule.rule_id,
            name = %rule.name,
            category = %rule.category,
            threshold = rule.threshold,
            "Rule created"
        );
        Ok(rule)
    }

    /// Active rules as stored, newest first
    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        self.store.list_active_rules().await
    }

    /// Soft-deactivate
    pub async fn delete_rule(&self, rule_id: &str) -> Result<()> {
        let (deactivated, removed) = {
            let _sync = self.engine.lock_sync().await;
            let deactivated = self.store.deactivate_rule(rule_id).await?;
            (deactivated, self.engine.remove_rule(rule_id).await)
        };
        if !deactivated && !removed {
            return Err(Error::NotFound(format!("rule {}", rule_id)));
        }
        tracing::info!(rule_id = %rule_id, "Rule deactivated");
        Ok(())
    }
}
