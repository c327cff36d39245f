//! REST endpoints of the harness server
//!
//! Each sending endpoint delivers one message to the Dor app, captures the
//! reply in the shared run context and answers with a Postman-friendly summary.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::runner::scenario::{self, GREETING};
use crate::runner::{CapturedReply, RunContext, ScenarioDriver, StepResult, SuiteReport};
use crate::simulator::{Messenger, Reply, ReplyContent, SimulatedMessage};
use crate::utils::config::HarnessConfig;

/// Shared state for API handlers
pub struct AppState {
    pub config: HarnessConfig,
    pub messenger: Arc<dyn Messenger>,
    /// Held for the whole request so runs never interleave
    pub context: Mutex<RunContext>,
}

impl AppState {
    pub fn new(config: HarnessConfig, messenger: Arc<dyn Messenger>) -> Self {
        let context = RunContext::from_config(&config);
        Self {
            config,
            messenger,
            context: Mutex::new(context),
        }
    }
}

/// Request body for the `/test` endpoints
#[derive(Debug, Default, Deserialize)]
pub struct MessageBody {
    pub message: Option<String>,
    pub text: Option<String>,
}

impl MessageBody {
    fn text_or_hi(self) -> String {
        self.message
            .filter(|m| !m.is_empty())
            .or(self.text.filter(|t| !t.is_empty()))
            .unwrap_or_else(|| "Hi".to_string())
    }
}

/// Response for every sending endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub test: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub test_mode: bool,
    /// The app's own reply; absent when it gave no test-mode echo
    pub dor_app_response: Option<ReplyContent>,
    pub captured_responses: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub scenarios: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsesPayload {
    pub count: usize,
    pub responses: Vec<CapturedReply>,
    pub test_mode_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsPayload {
    pub count: usize,
    pub results: Vec<StepResult>,
}

/// Build API router
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(describe))
        .route("/send/hi", post(send_hi))
        .route("/send/:message", post(send_message))
        .route("/:phone_number/test", post(send_as_phone))
        .route("/test", post(send_test))
        .route("/responses", get(get_responses))
        .route("/test/hi", post(test_hi))
        .route("/test/clear", post(clear))
        .route("/test/results", get(get_results))
        .route("/test/run", post(run_scenarios))
}

/// GET / - Self description
async fn describe(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let base = format!("http://localhost:{}", state.config.port);
    Json(json!({
        "name": "Dor Test Server",
        "description": "WhatsApp simulation server for testing the Dor app",
        "port": state.config.port,
        "dorAppUrl": state.config.app_url,
        "endpoints": {
            "POST /send/hi": "Send \"Hi\" to the Dor app",
            "POST /send/:message": "Send a custom text message",
            "POST /:phoneNumber/test": "Send as a specific phone number (body: {\"message\": \"hi\"})",
            "POST /test": "Send with the default phone number (body: {\"message\": \"hi\"} or {\"text\": \"hi\"})",
            "GET /responses": "All captured replies",
            "POST /test/hi": "Check the \"Hi\" reply contains the welcome prompt",
            "POST /test/clear": "Clear captured replies and results",
            "GET /test/results": "Results of checks run so far",
            "POST /test/run": "Run scenarios (body: {\"scenarios\": [\"greeting\", \"booking\"]})"
        },
        "examples": [
            format!("curl -X POST {}/0535305225/test -H 'Content-Type: application/json' -d '{{\"message\": \"hi\"}}'", base),
            format!("curl -X POST {}/test -H 'Content-Type: application/json' -d '{{\"text\": \"hello\"}}'", base),
            format!("curl -X POST {}/test -H 'Content-Type: application/json' -d '{{}}'", base),
            format!("curl -X POST {}/test/run -H 'Content-Type: application/json' -d '{{\"scenarios\": [\"greeting\"]}}'", base),
        ]
    }))
}

/// Deliver one message and capture whatever reply content came back
async fn deliver(
    state: &AppState,
    message: SimulatedMessage,
    label: String,
    phone_number: Option<String>,
) -> Json<SendResponse> {
    let mut ctx = state.context.lock().await;
    log::info!("Testing message: {:?}", message.display_text());

    let outcome = state.messenger.send(&message).await;
    let (success, test_mode, reply, error) = match outcome {
        Ok(delivery) => {
            ctx.capture(&delivery.reply);
            match delivery.reply {
                Reply::Genuine(content) => (true, true, Some(content), None),
                Reply::Fallback(_) => (true, false, None, None),
                Reply::Malformed(_) => (true, true, None, Some("malformed reply".to_string())),
            }
        }
        Err(e) => (false, false, None, Some(e.to_string())),
    };

    Json(SendResponse {
        success,
        test: label,
        phone_number,
        test_mode,
        dor_app_response: reply,
        captured_responses: ctx.captures().len(),
        error,
        timestamp: Utc::now(),
    })
}

/// POST /send/hi
async fn send_hi(State(state): State<Arc<AppState>>) -> Json<SendResponse> {
    deliver(
        &state,
        SimulatedMessage::text("Hi"),
        "Hi message".to_string(),
        None,
    )
    .await
}

/// POST /send/:message
async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(message): Path<String>,
) -> Json<SendResponse> {
    let label = format!("Custom message: {}", message);
    deliver(&state, SimulatedMessage::text(message), label, None).await
}

/// POST /:phoneNumber/test
async fn send_as_phone(
    State(state): State<Arc<AppState>>,
    Path(phone_number): Path<String>,
    body: Option<Json<MessageBody>>,
) -> Json<SendResponse> {
    let text = body.map(|Json(b)| b).unwrap_or_default().text_or_hi();
    let label = format!("Message: {}", text);
    let message = SimulatedMessage::text(text).from_sender(phone_number.clone());
    deliver(&state, message, label, Some(phone_number)).await
}

/// POST /test
async fn send_test(
    State(state): State<Arc<AppState>>,
    body: Option<Json<MessageBody>>,
) -> Json<SendResponse> {
    let text = body.map(|Json(b)| b).unwrap_or_default().text_or_hi();
    let label = format!("Message: {}", text);
    deliver(&state, SimulatedMessage::text(text), label, None).await
}

/// GET /responses
async fn get_responses(State(state): State<Arc<AppState>>) -> Json<ResponsesPayload> {
    let ctx = state.context.lock().await;
    Json(ResponsesPayload {
        count: ctx.captures().len(),
        responses: ctx.captures().to_vec(),
        // Every request carries the test-mode header
        test_mode_enabled: true,
    })
}

/// POST /test/hi - Greeting check on a clean slate
async fn test_hi(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut ctx = state.context.lock().await;
    ctx.clear();

    let driver = ScenarioDriver::new(state.messenger.clone(), Duration::ZERO);
    let summary = driver.run(&scenario::greeting(), &mut ctx).await;

    match summary.results.into_iter().next() {
        Some(result) => Json(result).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "greeting check produced no result" })),
        )
            .into_response(),
    }
}

/// POST /test/clear
async fn clear(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.context.lock().await.clear();
    log::info!("All test data cleared");
    Json(json!({
        "message": "All test data cleared",
        "timestamp": Utc::now(),
    }))
}

/// GET /test/results
async fn get_results(State(state): State<Arc<AppState>>) -> Json<ResultsPayload> {
    let ctx = state.context.lock().await;
    Json(ResultsPayload {
        count: ctx.results().len(),
        results: ctx.results().to_vec(),
    })
}

/// POST /test/run - Clear, then run the named scenarios in order
async fn run_scenarios(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> impl IntoResponse {
    let mut names = body.map(|Json(b)| b.scenarios).unwrap_or_default();
    if names.is_empty() {
        names.push(GREETING.to_string());
    }

    let mut scenarios = Vec::new();
    for name in &names {
        match scenario::builtin(name, &state.config) {
            Some(Ok(s)) => scenarios.push(s),
            Some(Err(e)) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": format!("invalid pattern in scenario {}: {}", name, e) })),
                )
                    .into_response()
            }
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("unknown scenario: {}", name) })),
                )
                    .into_response()
            }
        }
    }

    let mut ctx = state.context.lock().await;
    ctx.clear();

    let driver = ScenarioDriver::new(state.messenger.clone(), state.config.step_delay());
    let mut runs = Vec::new();
    for (index, s) in scenarios.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(state.config.step_delay()).await;
        }
        runs.push(driver.run(s, &mut ctx).await);
    }

    Json(SuiteReport::from_runs(runs)).into_response()
}
