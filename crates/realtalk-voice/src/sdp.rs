use crate::config::RealtimeConfig;
use crate::error::VoiceError;
use crate::media::{SdpKind, SessionDescription};
use async_trait::async_trait;
use realtalk_types::SessionCredential;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

/// Offer/answer exchange with the remote realtime endpoint.
#[async_trait]
pub trait SdpExchange: Send + Sync {
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: &SessionCredential,
    ) -> Result<SessionDescription, VoiceError>;
}

/// Posts the raw offer SDP and reads the answer SDP from the response body.
#[derive(Debug, Clone)]
pub struct HttpSdpExchange {
    client: reqwest::Client,
    url: String,
    model: Option<String>,
}

impl HttpSdpExchange {
    pub fn new(config: &RealtimeConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(
            client,
            &config.realtime_url,
            config.model.clone(),
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            model,
        }
    }
}

#[async_trait]
impl SdpExchange for HttpSdpExchange {
    async fn exchange(
        &self,
        offer: &SessionDescription,
        credential: &SessionCredential,
    ) -> Result<SessionDescription, VoiceError> {
        if offer.kind != SdpKind::Offer {
            return Err(VoiceError::Negotiation(
                "only an offer can be sent to the realtime endpoint".to_string(),
            ));
        }

        let mut request = self
            .client
            .post(&self.url)
            .bearer_auth(credential.value())
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer.sdp.clone());
        if let Some(model) = &self.model {
            request = request.query(&[("model", model.as_str())]);
        }

        debug!(url = %self.url, offer_bytes = offer.sdp.len(), "sending SDP offer");

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "realtime endpoint rejected SDP offer");
            return Err(VoiceError::Negotiation(format!(
                "realtime endpoint returned {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let sdp = response
            .text()
            .await
            .map_err(|e| VoiceError::Negotiation(format!("failed to read answer: {}", e)))?;
        if sdp.trim().is_empty() {
            return Err(VoiceError::Negotiation(
                "realtime endpoint returned an empty answer".to_string(),
            ));
        }

        Ok(SessionDescription::answer(sdp))
    }
}
