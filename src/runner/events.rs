use super::state::RunSummary;
use tokio::sync::broadcast;

/// Run progress events for real-time updates
#[derive(Debug, Clone)]
pub enum RunEvent {
    ScenarioStarted {
        session_id: String,
        scenario: String,
        step_count: usize,
    },
    ScenarioFinished {
        summary: RunSummary,
    },

    StepStarted {
        index: usize,
        step: String,
        input: String,
    },
    StepPassed {
        index: usize,
        step: String,
        reply: String,
        duration_ms: u64,
    },
    StepFailed {
        index: usize,
        step: String,
        error: String,
        duration_ms: u64,
    },
    StepSkipped {
        index: usize,
        step: String,
        reason: String,
    },

    Log {
        message: String,
    },
}

/// Broadcasts run events to any number of listeners
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Prints run events to the console as they arrive
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Hidden target when piped, to keep escape codes out of logs
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                RunEvent::ScenarioStarted {
                    session_id,
                    scenario,
                    step_count,
                } => {
                    println!(
                        "\n{} Scenario: {} ({} steps) [{}]",
                        "▶".green().bold(),
                        scenario.white().bold(),
                        step_count,
                        session_id.cyan()
                    );
                }

                RunEvent::StepStarted { index, step, input } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    step_text = format!("[{}] {} → {:?} ", index + 1, step, input.dimmed());
                    pb.set_message(step_text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                RunEvent::StepPassed {
                    reply, duration_ms, ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✓".green(), step_text, duration_ms);
                    println!("        {}", first_line(&reply).dimmed());
                }

                RunEvent::StepFailed {
                    error, duration_ms, ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("    {} {}({}ms)", "✗".red(), step_text, duration_ms);
                    println!("        {}", error.red());
                }

                RunEvent::StepSkipped {
                    index, step, reason, ..
                } => {
                    println!(
                        "    {} [{}] {} ({})",
                        "○".yellow(),
                        index + 1,
                        step,
                        reason.dimmed()
                    );
                }

                RunEvent::Log { message } => {
                    multi.println(format!("      {}", message)).ok();
                }

                RunEvent::ScenarioFinished { summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish();
                    }
                    let status = if summary.is_success() {
                        "PASSED".green().bold()
                    } else if summary.aborted {
                        "ABORTED".red().bold()
                    } else {
                        "FAILED".red().bold()
                    };
                    println!("\n{} Scenario {} [{}]", "■".blue().bold(), summary.scenario, status);
                    println!(
                        "  {} passed, {} failed, {} errors, {} not run",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.errors.to_string().red(),
                        summary.not_run.len().to_string().yellow()
                    );
                    println!("  Duration: {}ms", summary.duration_ms);
                }
            }
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
