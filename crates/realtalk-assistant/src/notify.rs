//! Email notification for saved messages.
//!
//! Every saved message triggers one `POST /send-email` carrying the whole
//! session log as a plain-text body.

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use async_trait::async_trait;
use realtalk_types::StoredMessage;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailNotification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: EmailNotification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(config: &NotifyConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, &config.url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: EmailNotification) -> Result<(), NotifyError> {
        debug!(url = %self.url, subject = %notification.subject, "sending notification");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|json| json.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        warn!(status = status.as_u16(), reason = %reason, "notification rejected");
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

/// Renders the message log as blank-line separated records.
pub fn format_records(messages: &[StoredMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "From: {}\nContact: {}\nUrgency: {}\nTime: {}\nMessage: {}",
                m.name,
                m.contact.as_deref().unwrap_or("Not provided"),
                m.urgency.as_deref().unwrap_or("Not specified"),
                m.timestamp,
                m.message,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The notification for the current log, addressed per `config`.
///
/// The subject names the sender of the most recent message. Returns `None`
/// for an empty log.
pub fn compose(messages: &[StoredMessage], config: &NotifyConfig) -> Option<EmailNotification> {
    let latest = messages.last()?;
    let subject = if config.subject_prefix.trim().is_empty() {
        format!("New message from {}", latest.name)
    } else {
        format!("{} New message from {}", config.subject_prefix.trim(), latest.name)
    };
    Some(EmailNotification {
        to: config.recipient.clone(),
        subject,
        body: format_records(messages),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(name: &str, contact: Option<&str>, urgency: Option<&str>, text: &str) -> StoredMessage {
        StoredMessage {
            name: name.to_string(),
            contact: contact.map(str::to_string),
            message: text.to_string(),
            urgency: urgency.map(str::to_string),
            timestamp: "2026-01-05T09:30:00Z".to_string(),
        }
    }

    #[test]
    fn missing_optional_fields_are_spelled_out() {
        let body = format_records(&[message("Jane", None, None, "hi")]);
        assert_eq!(
            body,
            "From: Jane\nContact: Not provided\nUrgency: Not specified\nTime: 2026-01-05T09:30:00Z\nMessage: hi"
        );
    }

    #[test]
    fn records_are_blank_line_separated() {
        let body = format_records(&[
            message("Jane", Some("jane@example.org"), Some("high"), "call me"),
            message("Sam", None, Some("low"), "no rush"),
        ]);
        let records: Vec<&str> = body.split("\n\n").collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains("Contact: jane@example.org"));
        assert!(records[1].starts_with("From: Sam"));
    }

    #[test]
    fn subject_names_latest_sender() {
        let config = NotifyConfig {
            subject_prefix: "[realtalk]".to_string(),
            ..NotifyConfig::default()
        };
        let n = compose(
            &[message("Jane", None, None, "a"), message("Sam", None, None, "b")],
            &config,
        )
        .unwrap();
        assert_eq!(n.subject, "[realtalk] New message from Sam");
        assert_eq!(n.to, config.recipient);

        assert!(compose(&[], &config).is_none());
    }
}
