pub mod context;
pub mod events;
pub mod executor;
pub mod expect;
pub mod scenario;
pub mod state;

use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use context::RunContext;
pub use events::*;
pub use executor::ScenarioDriver;
pub use expect::{Check, Expectation};
pub use scenario::{Scenario, SelectKind, Step, StepInput};
pub use state::*;

use crate::simulator::WebhookClient;
use crate::utils::config::HarnessConfig;
use crate::verify::{BookingCriteria, Verification, Verifier};

/// Name of the step appended after the booking conversation
pub const VERIFICATION_STEP: &str = "database_verification";

const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// Confirm the Dor app answers HTTP at all
pub async fn preflight(app_url: &str) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(PREFLIGHT_TIMEOUT)
        .build()?;
    let response = http
        .get(app_url)
        .send()
        .await
        .with_context(|| format!("Dor app is not reachable at {}", app_url))?;
    log::debug!("Preflight {} -> {}", app_url, response.status());
    Ok(())
}

/// Run a booking scenario, then look for the booking it should have created.
///
/// Verification is skipped (listed as not run) when the conversation aborted.
pub async fn run_booking_flow(
    config: &HarnessConfig,
    driver: &ScenarioDriver,
    verifier: Option<&Verifier>,
    scenario: &Scenario,
    ctx: &mut RunContext,
) -> RunSummary {
    let mut summary = driver.run(scenario, ctx).await;

    let Some(verifier) = verifier else {
        return summary;
    };

    if summary.aborted {
        summary.push_not_run(VERIFICATION_STEP);
        return summary;
    }

    driver.emit(RunEvent::Log {
        message: format!(
            "Waiting {}ms before checking the database",
            config.timeouts.database_wait_ms
        ),
    });
    tokio::time::sleep(config.verify_delay()).await;

    let criteria = BookingCriteria::today(config);
    let result = verification_step(verifier, &criteria).await;
    driver.emit(RunEvent::Log {
        message: match &result.error {
            None => format!("{} Booking found in database", "✓".green()),
            Some(e) => format!("{} {}", "✗".red(), e),
        },
    });
    ctx.record(result.clone());
    summary.push_result(result);
    summary
}

async fn verification_step(verifier: &Verifier, criteria: &BookingCriteria) -> StepResult {
    let input = format!(
        "user={} service={} provider={} from={}",
        criteria.subject_id,
        criteria.service_id,
        criteria.provider_id,
        criteria.not_before_str()
    );
    let started = Instant::now();
    let outcome = verifier.verify(criteria).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Verification::Found(record)) => StepResult::passed(VERIFICATION_STEP, &input)
            .with_booking(record)
            .with_duration(duration_ms),
        Ok(Verification::NotFound { reason }) => {
            StepResult::failed(VERIFICATION_STEP, &input, reason).with_duration(duration_ms)
        }
        Err(e) => StepResult::failed(VERIFICATION_STEP, &input, e.to_string())
            .with_duration(duration_ms),
    }
}

/// Everything the `run` command needs, validated before any traffic is sent
pub struct BookingRun {
    pub config: HarnessConfig,
    pub scenario: Scenario,
    /// Extra variables, applied over the ones derived from config
    pub vars: HashMap<String, String>,
    pub verify: bool,
}

impl BookingRun {
    pub async fn execute(self) -> Result<RunSummary> {
        // Missing store credentials must stop the run before the first message
        let target = if self.verify {
            Some(self.config.require_store()?)
        } else {
            None
        };

        let client = WebhookClient::from_config(&self.config)
            .context("Failed to build webhook client")?;

        println!(
            "{} Dor app: {}",
            "ℹ".blue(),
            client.webhook_url().cyan()
        );
        preflight(&self.config.app_url).await?;

        let verifier = match target {
            Some(ref target) => Some(
                Verifier::connect(target, self.config.request_timeout())
                    .await
                    .context("Failed to open data store")?,
            ),
            None => None,
        };

        let driver = ScenarioDriver::with_console(Arc::new(client), self.config.step_delay());
        let mut ctx = RunContext::from_config(&self.config);
        for (name, value) in &self.vars {
            ctx.set_var(name, value);
        }

        let summary = run_booking_flow(
            &self.config,
            &driver,
            verifier.as_ref(),
            &self.scenario,
            &mut ctx,
        )
        .await;

        // Let the console listener drain
        tokio::time::sleep(Duration::from_millis(200)).await;

        Ok(summary)
    }
}
