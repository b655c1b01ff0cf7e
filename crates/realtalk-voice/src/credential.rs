use crate::config::RealtimeConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use chrono::DateTime;
use realtalk_types::SessionCredential;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of ephemeral session credentials.
///
/// Implementations make exactly one attempt per call. Retrying is the
/// supervisor's job.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch_credential(&self) -> Result<SessionCredential, VoiceError>;
}

/// Fetches credentials from the backend minting endpoint (`POST /session`).
#[derive(Debug, Clone)]
pub struct HttpCredentialFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpCredentialFetcher {
    pub fn new(config: &RealtimeConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, &config.session_url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch_credential(&self) -> Result<SessionCredential, VoiceError> {
        debug!(url = %self.url, "requesting session credential");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| VoiceError::Session(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::Session(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let reason = error_reason(&body).unwrap_or_else(|| "no error detail".to_string());
            warn!(status = status.as_u16(), reason = %reason, "session endpoint rejected request");
            return Err(VoiceError::Session(format!(
                "status {}: {}",
                status.as_u16(),
                reason
            )));
        }

        parse_credential(&body)
    }
}

/// Extracts `client_secret.value` (and optional `expires_at`) from a
/// successful minting response.
pub fn parse_credential(body: &str) -> Result<SessionCredential, VoiceError> {
    let json: Value = serde_json::from_str(body).map_err(|e| {
        VoiceError::InvalidCredential(format!("response is not valid JSON: {}", e))
    })?;

    let secret = json.get("client_secret");
    let value = secret
        .and_then(|s| s.get("value"))
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            VoiceError::InvalidCredential("response is missing client_secret.value".to_string())
        })?;

    let expires_at = secret
        .and_then(|s| s.get("expires_at"))
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(SessionCredential::new(value, expires_at))
}

/// Pulls a human-readable reason out of an error body. Accepts both
/// `{"error": "..."}` and `{"error": {"message": "..."}}`.
fn error_reason(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    match json.get("error")? {
        Value::String(s) => Some(s.clone()),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_secret_and_expiry() {
        let cred = parse_credential(
            r#"{"id":"sess_1","model":"gpt-4o-realtime-preview","client_secret":{"value":"ek_123","expires_at":1735689600}}"#,
        )
        .unwrap();
        assert_eq!(cred.value(), "ek_123");
        assert_eq!(cred.expires_at().map(|t| t.timestamp()), Some(1_735_689_600));
    }

    #[test]
    fn missing_or_empty_secret_is_a_config_problem() {
        for body in [
            r#"{"client_secret":{}}"#,
            r#"{"client_secret":{"value":""}}"#,
            r#"{"model":"x"}"#,
            "<html>",
        ] {
            assert!(
                matches!(parse_credential(body), Err(VoiceError::InvalidCredential(_))),
                "body {body} should be rejected"
            );
        }
    }

    #[test]
    fn error_reason_handles_both_shapes() {
        assert_eq!(
            error_reason(r#"{"error":"rate limited"}"#).as_deref(),
            Some("rate limited")
        );
        assert_eq!(
            error_reason(r#"{"error":{"message":"quota"}}"#).as_deref(),
            Some("quota")
        );
        assert_eq!(error_reason("oops"), None);
    }
}
