//! Notifier - outbound alert email
//!
//! ## Responsibilities
//!
//! - Render the alert email (subject + HTML body)
//! - Hand it to a mail relay over HTTP, one message per recipient
//!
//! Only ever called from background workers; the frame loop never waits on it.

use crate::detection::Category;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Email sender
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send_alert_email(
        &self,
        rule_name: &str,
        category: Category,
        count: usize,
        recipients: &[String],
    ) -> Result<()>;
}

/// Rendered alert email
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEmail {
    pub subject: String,
    pub html_body: String,
}

impl AlertEmail {
    pub fn render(
        rule_name: &str,
        category: Category,
        count: usize,
        camera_label: &str,
        at: DateTime<Utc>,
    ) -> Self {
        let subject = format!("INTRUDER ALERT: {}", rule_name);
        let html_body = format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif; background-color: #f4f4f4; padding: 20px;">
    <div style="background-color: #ff4444; color: white; padding: 20px; border-radius: 5px; margin-bottom: 20px;">
      <h2 style="margin: 0;">SECURITY ALERT</h2>
    </div>
    <div style="background-color: white; padding: 20px; border-radius: 5px;">
      <p><strong>Rule:</strong> {rule}</p>
      <p><strong>Detection Type:</strong> {category}</p>
      <p><strong>Count Detected:</strong> {count}</p>
      <p><strong>Time:</strong> {time}</p>
      <p><strong>Camera:</strong> {camera}</p>
      <hr>
      <p style="color: #666;">A detection event has been triggered. Please check your system immediately.</p>
    </div>
  </body>
</html>"#,
            rule = escape_html(rule_name),
            category = category.as_str().to_uppercase(),
            count = count,
            time = at.format("%Y-%m-%d %H:%M:%S UTC"),
            camera = escape_html(camera_label),
        );
        Self { subject, html_body }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// HTTP mail relay client
///
/// `POST {relay_url}` with `{"from","to","subject","html"}` per recipient.
pub struct MailRelayNotifier {
    client: reqwest::Client,
    relay_url: String,
    sender: String,
    camera_label: String,
}

impl MailRelayNotifier {
    pub fn new(relay_url: String, sender: String, camera_label: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            relay_url,
            sender,
            camera_label,
        })
    }
}

#[async_trait]
impl EmailNotifier for MailRelayNotifier {
    async fn send_alert_email(
        &self,
        rule_name: &str,
        category: Category,
        count: usize,
        recipients: &[String],
    ) -> Result<()> {
        let email = AlertEmail::render(rule_name, category, count, &self.camera_label, Utc::now());
        let mut failed = Vec::new();

        for to in recipients {
            let msg = RelayMessage {
                from: &self.sender,
                to,
                subject: &email.subject,
                html: &email.html_body,
            };
            match self.client.post(&self.relay_url).json(&msg).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(
                        recipient = %to,
                        rule_name = %rule_name,
                        category = %category,
                        count = count,
                        "Alert email sent"
                    );
                }
                Ok(resp) => {
                    tracing::warn!(
                        recipient = %to,
                        status = %resp.status(),
                        "Mail relay rejected message"
                    );
                    failed.push(to.clone());
                }
                Err(e) => {
                    tracing::warn!(recipient = %to, error = %e, "Mail relay request failed");
                    failed.push(to.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Notification(format!(
                "{} of {} recipients failed: {}",
                failed.len(),
                recipients.len(),
                failed.join(", ")
            )))
        }
    }
}

/// Notifier used when no relay is configured; logs what would have been sent
pub struct DisabledNotifier;

#[async_trait]
impl EmailNotifier for DisabledNotifier {
    async fn send_alert_email(
        &self,
        rule_name: &str,
        category: Category,
        count: usize,
        recipients: &[String],
    ) -> Result<()> {
        tracing::info!(
            rule_name = %rule_name,
            category = %category,
            count = count,
            recipients = recipients.len(),
            "Email disabled (MAIL_RELAY_URL not set); alert email not sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_email() {
        let email = AlertEmail::render("Front <door>", Category::Person, 2, "Camera 3", Utc::now());
        assert_eq!(email.subject, "INTRUDER ALERT: Front <door>");
        assert!(email.html_body.contains("Front &lt;door&gt;"));
        assert!(email.html_body.contains("PERSON"));
        assert!(email.html_body.contains("<strong>Count Detected:</strong> 2"));
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_ok() {
        let n = DisabledNotifier;
        assert!(n
            .send_alert_email("r", Category::Vehicle, 1, &["a@b.io".to_string()])
            .await
            .is_ok());
    }
}
