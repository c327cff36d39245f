use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::Duration;

use super::message::{Reply, SimulatedMessage, WebhookEnvelope};
use super::{Delivery, Messenger, NetworkError};
use crate::utils::config::HarnessConfig;

/// Marker header asking the Dor app to echo its reply synchronously
pub const TEST_MODE_HEADER: &str = "X-Test-Mode";
pub const HARNESS_USER_AGENT: &str = "DorTest/1.0";

/// Delivers simulated messages to the Dor app webhook over HTTP
pub struct WebhookClient {
    http: reqwest::Client,
    webhook_url: String,
    default_sender: String,
    channel_id: String,
}

impl WebhookClient {
    pub fn new(
        app_url: &str,
        default_sender: &str,
        channel_id: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            webhook_url: format!("{}/webhook", app_url.trim_end_matches('/')),
            default_sender: default_sender.to_string(),
            channel_id: channel_id.to_string(),
        })
    }

    pub fn from_config(config: &HarnessConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            &config.app_url,
            &config.sender,
            &config.channel_id,
            config.request_timeout(),
        )
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    pub fn default_sender(&self) -> &str {
        &self.default_sender
    }

    /// Build the provider envelope for a message
    pub fn envelope(&self, message: &SimulatedMessage) -> WebhookEnvelope {
        WebhookEnvelope::wrap(message.to_provider(&self.default_sender), &self.channel_id)
    }
}

#[async_trait]
impl Messenger for WebhookClient {
    async fn send(&self, message: &SimulatedMessage) -> Result<Delivery, NetworkError> {
        let envelope = self.envelope(message);
        log::debug!(
            "Sending to Dor app: {}",
            serde_json::to_string(&envelope).unwrap_or_default()
        );

        let response = self
            .http
            .post(&self.webhook_url)
            .header(CONTENT_TYPE, "application/json")
            .header(TEST_MODE_HEADER, "true")
            .header(USER_AGENT, HARNESS_USER_AGENT)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                let err = NetworkError::from_reqwest(&e);
                log::warn!("Error sending to Dor app: {}", err);
                err
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::from_reqwest(&e))?;

        if !status.is_success() {
            let err = NetworkError::status(status.as_u16(), &String::from_utf8_lossy(&body));
            log::warn!("Dor app rejected message: {}", err);
            return Err(err);
        }

        log::debug!("Dor app response: {}", status);

        let reply = Reply::decode(&body, message);
        match &reply {
            Reply::Genuine(_) => log::debug!("Test mode response received from Dor app"),
            Reply::Fallback(_) => log::debug!("No test mode echo, using synthesized fallback"),
            Reply::Malformed(raw) => log::warn!("Malformed reply from Dor app: {}", raw),
        }

        Ok(Delivery {
            status: status.as_u16(),
            reply,
        })
    }
}
