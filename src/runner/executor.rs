use std::sync::Arc;
use std::time::{Duration, Instant};

use super::context::RunContext;
use super::events::{ConsoleEventListener, EventEmitter, RunEvent};
use super::scenario::{Scenario, Step};
use super::state::{RunSummary, StepResult};
use crate::simulator::{Messenger, Reply};

/// Failure text for a step whose reply was synthesized by the harness
pub const FALLBACK_ERROR: &str = "application returned no test-mode reply";
pub const MALFORMED_ERROR: &str = "malformed reply";

/// Runs scenarios step by step through a messenger
pub struct ScenarioDriver {
    messenger: Arc<dyn Messenger>,
    step_delay: Duration,
    emitter: EventEmitter,
}

impl ScenarioDriver {
    pub fn new(messenger: Arc<dyn Messenger>, step_delay: Duration) -> Self {
        let (emitter, _) = EventEmitter::new();
        Self {
            messenger,
            step_delay,
            emitter,
        }
    }

    /// Driver that prints progress to the console
    pub fn with_console(messenger: Arc<dyn Messenger>, step_delay: Duration) -> Self {
        let (emitter, receiver) = EventEmitter::new();
        tokio::spawn(ConsoleEventListener::listen(receiver));
        Self {
            messenger,
            step_delay,
            emitter,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.emitter.subscribe()
    }

    pub fn emit(&self, event: RunEvent) {
        self.emitter.emit(event);
    }

    /// Run every step in order. A fatal delivery failure aborts the rest.
    pub async fn run(&self, scenario: &Scenario, ctx: &mut RunContext) -> RunSummary {
        let started = Instant::now();
        log::info!(
            "Running scenario '{}' ({} steps)",
            scenario.name,
            scenario.len()
        );
        self.emitter.emit(RunEvent::ScenarioStarted {
            session_id: ctx.session_id.clone(),
            scenario: scenario.name.clone(),
            step_count: scenario.len(),
        });

        let mut results = Vec::new();
        let mut not_run = Vec::new();
        let mut aborted = false;

        for (index, step) in scenario.steps.iter().enumerate() {
            if index > 0 && !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }

            let (result, fatal) = self.run_step(index, step, scenario, ctx).await;
            ctx.record(result.clone());
            results.push(result);

            if fatal {
                log::error!("Step '{}' got no response, aborting run", step.name);
                aborted = true;
                for (offset, skipped) in scenario.steps[index + 1..].iter().enumerate() {
                    not_run.push(skipped.name.clone());
                    self.emitter.emit(RunEvent::StepSkipped {
                        index: index + 1 + offset,
                        step: skipped.name.clone(),
                        reason: "run aborted".to_string(),
                    });
                }
                break;
            }
        }

        let mut summary = RunSummary::from_results(
            &ctx.session_id,
            &scenario.name,
            results,
            not_run,
            started.elapsed().as_millis() as u64,
        );
        summary.aborted |= aborted;

        log::info!(
            "Scenario '{}' finished: {} passed, {} failed, {} errors, {} not run",
            summary.scenario,
            summary.passed,
            summary.failed,
            summary.errors,
            summary.not_run.len()
        );
        self.emitter.emit(RunEvent::ScenarioFinished {
            summary: summary.clone(),
        });
        summary
    }

    /// Send one step and judge the reply. Returns the result and whether the run must abort.
    async fn run_step(
        &self,
        index: usize,
        step: &Step,
        scenario: &Scenario,
        ctx: &mut RunContext,
    ) -> (StepResult, bool) {
        let message = step.to_message(ctx, scenario.sender.as_deref());
        let input = message.display_text().to_string();

        self.emitter.emit(RunEvent::StepStarted {
            index,
            step: step.name.clone(),
            input: input.clone(),
        });

        let started = Instant::now();
        let sent = self.messenger.send(&message).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let delivery = match sent {
            Ok(delivery) => delivery,
            Err(err) => {
                let result =
                    StepResult::error(&step.name, &input, err.to_string()).with_duration(duration_ms);
                self.emit_failed(index, step, &result);
                return (result, err.is_fatal());
            }
        };

        ctx.capture(&delivery.reply);

        let result = match delivery.reply {
            Reply::Genuine(content) => {
                let evaluation = step.expect.evaluate(&content.content);
                let base = if evaluation.passed {
                    StepResult::passed(&step.name, &input)
                } else {
                    StepResult::failed(&step.name, &input, evaluation.describe_failure())
                };
                base.with_reply(content, true)
                    .with_checks(evaluation.checks)
            }
            Reply::Fallback(content) => {
                StepResult::failed(&step.name, &input, FALLBACK_ERROR).with_reply(content, false)
            }
            Reply::Malformed(raw) => {
                log::debug!("Malformed reply body: {}", raw);
                StepResult::error(&step.name, &input, MALFORMED_ERROR)
            }
        }
        .with_duration(duration_ms);

        if result.success {
            self.emitter.emit(RunEvent::StepPassed {
                index,
                step: step.name.clone(),
                reply: result
                    .reply
                    .as_ref()
                    .map(|r| r.content.clone())
                    .unwrap_or_default(),
                duration_ms,
            });
        } else {
            self.emit_failed(index, step, &result);
        }

        (result, false)
    }

    fn emit_failed(&self, index: usize, step: &Step, result: &StepResult) {
        self.emitter.emit(RunEvent::StepFailed {
            index,
            step: step.name.clone(),
            error: result.error.clone().unwrap_or_default(),
            duration_ms: result.duration_ms,
        });
    }
}
