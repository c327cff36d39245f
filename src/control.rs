//! Client for a running harness server, plus setup diagnostics

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::runner::{StepResult, SuiteReport};
use crate::server::api::{ResponsesPayload, ResultsPayload, SendResponse};
use crate::simulator::NetworkError;
use crate::utils::config::HarnessConfig;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const COMMUNICATION_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HarnessClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
}

impl HarnessClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid harness URL: {}", base_url))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(&config.harness_url, config.request_timeout())
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Harness URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: serde_json::Value,
    ) -> Result<T> {
        let url = self.url(segments)?;
        let response = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        decode(response).await
    }

    /// Greeting check on the server
    pub async fn hi(&self) -> Result<StepResult> {
        self.post(&["test", "hi"], serde_json::json!({})).await
    }

    /// Run scenarios on the server (empty list runs the default)
    pub async fn run_all(&self, scenarios: &[String]) -> Result<SuiteReport> {
        self.post(&["test", "run"], serde_json::json!({ "scenarios": scenarios }))
            .await
    }

    /// Send an arbitrary text message
    pub async fn send(&self, message: &str) -> Result<SendResponse> {
        self.post(&["send", message], serde_json::json!({})).await
    }

    /// Send as a specific phone number
    pub async fn send_as(&self, phone_number: &str, message: &str) -> Result<SendResponse> {
        self.post(
            &[phone_number, "test"],
            serde_json::json!({ "message": message }),
        )
        .await
    }

    pub async fn responses(&self) -> Result<ResponsesPayload> {
        self.get(&["responses"]).await
    }

    pub async fn results(&self) -> Result<ResultsPayload> {
        self.get(&["test", "results"]).await
    }

    pub async fn clear(&self) -> Result<serde_json::Value> {
        self.post(&["test", "clear"], serde_json::json!({})).await
    }

    /// Server self description
    pub async fn status(&self) -> Result<serde_json::Value> {
        self.get(&[]).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        anyhow::bail!("Harness server returned {}: {}", status, body);
    }
    serde_json::from_str(&body).with_context(|| format!("Unexpected harness response: {}", body))
}

/// Reachability of one HTTP endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum Reachability {
    Up { status: u16 },
    Down { code: String },
}

impl Reachability {
    pub fn is_up(&self) -> bool {
        matches!(self, Reachability::Up { .. })
    }
}

#[derive(Debug)]
pub struct DoctorReport {
    pub harness_url: String,
    pub app_url: String,
    pub harness: Reachability,
    /// Server name from the harness self description
    pub harness_name: Option<String>,
    pub app: Reachability,
    /// `None` when skipped because a server is down
    pub communication: Option<Result<SendResponse, String>>,
}

impl DoctorReport {
    pub fn all_ok(&self) -> bool {
        self.harness.is_up()
            && self.app.is_up()
            && matches!(self.communication, Some(Ok(ref r)) if r.success)
    }
}

async fn check(http: &reqwest::Client, url: &str) -> Reachability {
    match http.get(url).send().await {
        Ok(response) => Reachability::Up {
            status: response.status().as_u16(),
        },
        Err(e) => Reachability::Down {
            code: NetworkError::from_reqwest(&e).code(),
        },
    }
}

/// Check the harness server and the Dor app, then try one message through both
pub async fn doctor(config: &HarnessConfig) -> Result<DoctorReport> {
    let http = reqwest::Client::builder().timeout(CHECK_TIMEOUT).build()?;

    let harness = check(&http, &config.harness_url).await;
    let app = check(&http, &config.app_url).await;

    let client = HarnessClient::new(&config.harness_url, COMMUNICATION_TIMEOUT)?;
    let harness_name = if harness.is_up() {
        client
            .status()
            .await
            .ok()
            .and_then(|v| v["name"].as_str().map(str::to_string))
    } else {
        None
    };

    let communication = if harness.is_up() && app.is_up() {
        Some(client.send("Hi").await.map_err(|e| format!("{:#}", e)))
    } else {
        None
    };

    Ok(DoctorReport {
        harness_url: config.harness_url.clone(),
        app_url: config.app_url.clone(),
        harness,
        harness_name,
        app,
        communication,
    })
}
