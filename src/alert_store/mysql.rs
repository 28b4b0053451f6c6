//! MySQL alert store
//!
//! Tables are created by `migrations/001_detection_tables.sql`.

use super::types::{AlertRecord, DetectionLogEntry};
use super::AlertStore;
use crate::detection::Category;
use crate::error::{Error, Result};
use crate::rule_engine::{AlertEvent, Rule, ValidRule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use uuid::Uuid;

/// MySqlStore instance
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Create new store
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn row_to_rule(row: &MySqlRow) -> Result<Rule> {
        let object_type: String = row.try_get("object_type")?;
        let category: Category = object_type.parse().map_err(|_| {
            Error::Persistence(format!("unknown object_type '{}' in detection_rules", object_type))
        })?;
        Ok(Rule {
            rule_id: row.try_get("id")?,
            name: row.try_get("name")?,
            category,
            threshold: row.try_get("threshold")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_alert(row: &MySqlRow) -> Result<AlertRecord> {
        let object_type: String = row.try_get("object_type")?;
        let category: Category = object_type.parse().map_err(|_| {
            Error::Persistence(format!("unknown object_type '{}' in alerts", object_type))
        })?;
        Ok(AlertRecord {
            timestamp: row.try_get("created_at")?,
            rule_id: row.try_get("rule_id")?,
            rule_name: row.try_get("rule_name")?,
            category,
            count: row.try_get("count")?,
            message: row.try_get("message")?,
        })
    }
}

#[async_trait]
impl AlertStore for MySqlStore {
    async fn insert_alert(&self, event: &AlertEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (rule_id, rule_name, object_type, count, message, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.rule_id)
        .bind(&event.rule_name)
        .bind(event.category.as_str())
        .bind(event.count as i64)
        .bind(&event.message)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_detection_log(&self, entry: &DetectionLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO detection_logs (frame_number, person_count, animal_count, vehicle_count, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.frame)
        .bind(entry.counts.get(Category::Person) as i64)
        .bind(entry.counts.get(Category::Animal) as i64)
        .bind(entry.counts.get(Category::Vehicle) as i64)
        .bind(entry.logged_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active_rules(&self) -> Result<Vec<Rule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, object_type, threshold, is_active, created_at
            FROM detection_rules
            WHERE is_active = TRUE
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_rule(row) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable rule row"),
            }
        }
        Ok(rules)
    }

    async fn list_active_recipient_emails(&self) -> Result<Vec<String>> {
        let emails: Vec<String> =
            sqlx::query_scalar("SELECT email FROM alert_settings WHERE is_active = TRUE")
                .fetch_all(&self.pool)
                .await?;
        Ok(emails)
    }

    async fn create_rule(&self, rule: &ValidRule) -> Result<Rule> {
        let rule_id = Uuid::new_v4().to_string();
        let created_at: DateTime<Utc> = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO detection_rules (id, name, object_type, threshold, is_active, created_at)
            VALUES (?, ?, ?, ?, TRUE, ?)
            "#,
        )
        .bind(&rule_id)
        .bind(&rule.name)
        .bind(rule.category.as_str())
        .bind(rule.threshold)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Rule {
            rule_id,
            name: rule.name.clone(),
            category: rule.category,
            threshold: rule.threshold,
            is_active: true,
            created_at,
        })
    }

    async fn deactivate_rule(&self, rule_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE detection_rules SET is_active = FALSE WHERE id = ? AND is_active = TRUE",
        )
        .bind(rule_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT rule_id, rule_name, object_type, count, message, created_at
            FROM alerts
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_alert).collect()
    }

    async fn add_recipients(&self, emails: &[String]) -> Result<usize> {
        let mut added = 0;
        for email in emails {
            let result = sqlx::query(
                r#"
                INSERT INTO alert_settings (email, is_active, created_at)
                VALUES (?, TRUE, ?)
                ON DUPLICATE KEY UPDATE is_active = TRUE
                "#,
            )
            .bind(email)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            // MySQL reports 1 for a fresh insert, 2 for an update that changed the row
            if result.rows_affected() > 0 {
                added += 1;
            }
        }
        Ok(added)
    }
}
