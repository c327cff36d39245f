use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dor_tester::parser::yaml::parse_scenario_content;
use dor_tester::runner::{
    run_booking_flow, scenario, BookingRun, RunContext, ScenarioDriver, StepStatus,
    VERIFICATION_STEP,
};
use dor_tester::simulator::WebhookClient;
use dor_tester::utils::config::{HarnessConfig, StoreTarget};
use dor_tester::verify::Verifier;
use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::json;

fn config_for(app_url: &str) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.app_url = app_url.to_string();
    config.timeouts.message_wait_ms = 0;
    config.timeouts.database_wait_ms = 0;
    config.booking.user_id = "user-1".to_string();
    config.booking.service_id = "svc-1".to_string();
    config.booking.provider_id = "prov-1".to_string();
    config
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

/// Dor app double answering the booking conversation in test mode
async fn mock_dor_app(server: &MockServer) -> (Mock<'_>, Mock<'_>, Mock<'_>) {
    let hi = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/webhook")
                .header("x-test-mode", "true")
                .body_contains(r#""body":"Hi""#);
            then.status(200).json_body(json!({
                "testMode": true,
                "response": { "type": "text", "content": "Welcome! Please enter your name:" }
            }));
        })
        .await;

    let name = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/webhook")
                .body_contains(r#""body":"John Doe""#);
            then.status(200).json_body(json!({
                "testMode": true,
                "response": { "type": "text", "content": "Hi John Doe! Main menu: 1. Book an appointment" }
            }));
        })
        .await;

    let choice = server
        .mock_async(|when, then| {
            when.method(POST).path("/webhook").body_contains(r#""body":"1""#);
            then.status(200).json_body(json!({
                "testMode": true,
                "response": {
                    "type": "text",
                    "content": "Choose a service, location, provider, date and time slot. Your appointment is confirmed."
                }
            }));
        })
        .await;

    (hi, name, choice)
}

async fn rest_verifier(server: &MockServer) -> Verifier {
    let target = StoreTarget::Rest {
        url: server.base_url(),
        api_key: "anon-key".to_string(),
    };
    Verifier::connect(&target, Duration::from_secs(5)).await.unwrap()
}

fn driver_for(config: &HarnessConfig) -> ScenarioDriver {
    let client = WebhookClient::from_config(config).unwrap();
    ScenarioDriver::new(Arc::new(client), config.step_delay())
}

#[tokio::test]
async fn booking_conversation_and_verification_pass() {
    let app = MockServer::start_async().await;
    let (hi, name, choice) = mock_dor_app(&app).await;

    let store = MockServer::start_async().await;
    let lookup = store
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/appointments")
                .query_param("user_id", "eq.user-1")
                .query_param("service_id", "eq.svc-1")
                .query_param("provider_id", "eq.prov-1");
            then.status(200).json_body(json!([{
                "appointment_id": "appt-7",
                "user_id": "user-1",
                "service_id": "svc-1",
                "provider_id": "prov-1",
                "slot_start": "2026-10-18T09:00:00+00:00",
                "status": "confirmed",
                "services": { "name": "Haircut" }
            }]));
        })
        .await;

    let config = config_for(&app.base_url());
    let driver = driver_for(&config);
    let verifier = rest_verifier(&store).await;
    let booking = scenario::booking(&config).unwrap();
    let mut ctx = RunContext::from_config(&config);

    let summary = run_booking_flow(&config, &driver, Some(&verifier), &booking, &mut ctx).await;

    hi.assert_hits_async(1).await;
    name.assert_hits_async(1).await;
    choice.assert_hits_async(6).await;
    lookup.assert_hits_async(1).await;

    assert_eq!(summary.total, 9);
    assert_eq!(summary.passed, 9);
    assert!(summary.is_success());
    assert!(!summary.aborted);

    let verification = summary.results.last().unwrap();
    assert_eq!(verification.step, VERIFICATION_STEP);
    let record = verification.booking.as_ref().unwrap();
    assert_eq!(record.appointment_id, "appt-7");
    assert_eq!(record.service_name.as_deref(), Some("Haircut"));

    assert_eq!(ctx.captures().len(), 8);
    assert_eq!(ctx.results().len(), 9);
    assert!(ctx.test_mode_seen());
}

#[tokio::test]
async fn missing_booking_fails_verification() {
    let app = MockServer::start_async().await;
    mock_dor_app(&app).await;

    let store = MockServer::start_async().await;
    store
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/appointments");
            then.status(200).json_body(json!([]));
        })
        .await;

    let config = config_for(&app.base_url());
    let driver = driver_for(&config);
    let verifier = rest_verifier(&store).await;
    let booking = scenario::booking(&config).unwrap();
    let mut ctx = RunContext::from_config(&config);

    let summary = run_booking_flow(&config, &driver, Some(&verifier), &booking, &mut ctx).await;

    assert_eq!(summary.passed, 8);
    assert_eq!(summary.failed, 1);
    assert!(!summary.is_success());

    let verification = summary.results.last().unwrap();
    assert_eq!(verification.status, StepStatus::Failed);
    assert!(verification
        .error
        .as_deref()
        .unwrap()
        .contains("no appointment found for user user-1"));
}

#[tokio::test]
async fn unreachable_app_aborts_before_verification() {
    let store = MockServer::start_async().await;
    let lookup = store
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/appointments");
            then.status(200).json_body(json!([]));
        })
        .await;

    let config = config_for(&closed_port_url());
    let driver = driver_for(&config);
    let verifier = rest_verifier(&store).await;
    let booking = scenario::booking(&config).unwrap();
    let mut ctx = RunContext::from_config(&config);

    let summary = run_booking_flow(&config, &driver, Some(&verifier), &booking, &mut ctx).await;

    lookup.assert_hits_async(0).await;

    assert!(summary.aborted);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].status, StepStatus::Error);
    assert!(summary.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("ECONNREFUSED"));

    assert_eq!(summary.not_run.len(), 8);
    assert_eq!(summary.not_run.first().map(String::as_str), Some("Enter name"));
    assert_eq!(
        summary.not_run.last().map(String::as_str),
        Some(VERIFICATION_STEP)
    );
    assert_eq!(summary.total, 9);
    assert!(ctx.captures().is_empty());
}

#[tokio::test]
async fn slow_app_times_out_and_aborts() {
    let app = MockServer::start_async().await;
    let webhook = app
        .mock_async(|when, then| {
            when.method(POST).path("/webhook");
            then.status(200)
                .delay(Duration::from_secs(2))
                .json_body(json!({ "response": { "type": "text", "content": "Welcome!" } }));
        })
        .await;

    let mut config = config_for(&app.base_url());
    config.timeouts.request_timeout_ms = 200;
    let driver = driver_for(&config);
    let booking = scenario::booking(&config).unwrap();
    let mut ctx = RunContext::from_config(&config);

    let summary = run_booking_flow(&config, &driver, None, &booking, &mut ctx).await;

    webhook.assert_hits_async(1).await;
    assert!(summary.aborted);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].status, StepStatus::Error);
    assert!(summary.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("ETIMEDOUT"));
    assert_eq!(summary.not_run.len(), 7);
    assert_eq!(summary.not_run.last().map(String::as_str), Some("Select time"));
}

#[tokio::test]
async fn yaml_scenario_uses_its_variables() {
    let app = MockServer::start_async().await;
    let (hi, name, _) = mock_dor_app(&app).await;

    let loaded = parse_scenario_content(
        r#"
name: onboarding
vars:
  customer: John Doe
steps:
  - send: Hi
    expect:
      containsAll: [welcome, name]
  - name: Type name
    send: ${customer}
    expect:
      matches: "main menu"
"#,
    )
    .unwrap();

    let config = config_for(&app.base_url());
    let driver = driver_for(&config);
    let mut ctx = RunContext::from_config(&config);
    for (key, value) in &loaded.vars {
        ctx.set_var(key, value);
    }

    let summary = run_booking_flow(&config, &driver, None, &loaded.scenario, &mut ctx).await;

    hi.assert_hits_async(1).await;
    name.assert_hits_async(1).await;
    assert_eq!(summary.total, 2);
    assert!(summary.is_success());
    assert_eq!(summary.results[1].step, "Type name");
    assert_eq!(summary.results[1].input, "John Doe");
}

#[tokio::test]
async fn run_without_store_credentials_sends_nothing() {
    let app = MockServer::start_async().await;
    let webhook = app
        .mock_async(|when, then| {
            when.method(POST).path("/webhook");
            then.status(200);
        })
        .await;

    let config = config_for(&app.base_url());
    let run = BookingRun {
        scenario: scenario::booking(&config).unwrap(),
        config,
        vars: HashMap::new(),
        verify: true,
    };

    let err = run.execute().await.unwrap_err();

    webhook.assert_hits_async(0).await;
    assert!(format!("{:#}", err).contains("SUPABASE_URL"));
}
