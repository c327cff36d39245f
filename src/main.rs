use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;

use dor_tester::control::{self, HarnessClient, Reachability};
use dor_tester::parser::parse_scenario_file;
use dor_tester::report::{self, RunReport};
use dor_tester::runner::{self, BookingRun, RunSummary, StepResult, StepStatus, SuiteReport};
use dor_tester::server::api::SendResponse;
use dor_tester::server::HarnessServer;
use dor_tester::utils::config::HarnessConfig;

#[derive(Parser)]
#[command(name = "dor-tester")]
#[command(author = "NL Team")]
#[command(version = "0.1.0")]
#[command(about = "WhatsApp webhook simulator and booking flow tester for the Dor app", long_about = None)]
struct Cli {
    /// Harness configuration file (YAML). Environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the harness server
    Serve {
        /// Server port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the booking conversation against the Dor app and verify the booking
    Run {
        /// Scenario file to run instead of the built-in booking flow
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Skip the database verification step
        #[arg(long, default_value = "false")]
        no_verify: bool,

        /// Output directory for reports
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Write JSON and JUnit reports
        #[arg(long, default_value = "false")]
        report: bool,
    },

    /// Ask the running harness to run the greeting check
    Hi,

    /// Ask the running harness to run scenarios
    All {
        /// Scenario names (default: greeting)
        scenarios: Vec<String>,
    },

    /// Send a text message through the running harness
    Send {
        message: String,

        /// Send as this phone number instead of the default sender
        #[arg(long)]
        phone: Option<String>,
    },

    /// Show replies captured by the running harness
    Responses,

    /// Show step results recorded by the running harness
    Results,

    /// Reset captured replies and results on the running harness
    Clear,

    /// Show the harness server's self description
    Status,

    /// Check the harness, the Dor app and the connection between them
    Doctor,

    /// Convert a saved JSON report
    Report {
        /// Path to report JSON
        results: PathBuf,

        /// Output format (junit, json)
        #[arg(short, long, default_value = "junit")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let mut config = HarnessConfig::load(cli.config.as_deref())?;
    log::debug!(
        "Dor app: {}, harness: {}, sender: {}",
        config.app_url,
        config.harness_url,
        config.sender
    );

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            HarnessServer::new(config).start().await?;
        }

        Commands::Run {
            scenario,
            no_verify,
            output,
            report: write_report,
        } => {
            let (scenario, vars) = match scenario {
                Some(path) => {
                    println!(
                        "{} Running scenario from: {}",
                        "▶".green().bold(),
                        path.display()
                    );
                    let loaded = parse_scenario_file(&path)?;
                    (loaded.scenario, loaded.vars)
                }
                None => {
                    println!("{} Running booking flow", "▶".green().bold());
                    let scenario = runner::scenario::booking(&config)
                        .context("Invalid reply pattern in configuration")?;
                    (scenario, HashMap::new())
                }
            };

            let app_url = config.app_url.clone();
            let run = BookingRun {
                config,
                scenario,
                vars,
                verify: !no_verify,
            };
            let summary = run.execute().await?;

            print_summary(&summary);

            if write_report {
                let run_report = RunReport::new(&app_url, summary.clone());
                report::write_reports(&run_report, &output)?;
            }

            if !summary.is_success() {
                anyhow::bail!(
                    "{} of {} steps did not pass",
                    summary.total - summary.passed,
                    summary.total
                );
            }
        }

        Commands::Hi => {
            let client = HarnessClient::from_config(&config)?;
            let result = client.hi().await?;
            print_step(&result);
            if !result.success {
                anyhow::bail!("Greeting check failed");
            }
        }

        Commands::All { scenarios } => {
            let client = HarnessClient::from_config(&config)?;
            let suite = client.run_all(&scenarios).await?;
            print_suite(&suite);
            if suite.passed != suite.total {
                anyhow::bail!("{} of {} steps did not pass", suite.total - suite.passed, suite.total);
            }
        }

        Commands::Send { message, phone } => {
            let client = HarnessClient::from_config(&config)?;
            let response = match phone {
                Some(ref phone) => client.send_as(phone, &message).await?,
                None => client.send(&message).await?,
            };
            print_send(&response);
        }

        Commands::Responses => {
            let client = HarnessClient::from_config(&config)?;
            let payload = client.responses().await?;
            println!(
                "{} {} captured response(s)",
                "ℹ".blue(),
                payload.count.to_string().bold()
            );
            for captured in &payload.responses {
                println!(
                    "  #{} [{}] {}",
                    captured.id,
                    captured.timestamp.format("%H:%M:%S"),
                    captured.response.content
                );
            }
        }

        Commands::Results => {
            let client = HarnessClient::from_config(&config)?;
            let payload = client.results().await?;
            println!(
                "{} {} recorded result(s)",
                "ℹ".blue(),
                payload.count.to_string().bold()
            );
            for result in &payload.results {
                print_step(result);
            }
        }

        Commands::Clear => {
            let client = HarnessClient::from_config(&config)?;
            client.clear().await?;
            println!("{} Captured responses and results cleared", "✓".green());
        }

        Commands::Status => {
            let client = HarnessClient::from_config(&config)?;
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Doctor => {
            let diagnosis = control::doctor(&config).await?;

            println!("{}", "Harness diagnostics".bold());
            print_reachability("Harness server", &diagnosis.harness_url, &diagnosis.harness);
            if let Some(ref name) = diagnosis.harness_name {
                println!("    {}", name.dimmed());
            }
            print_reachability("Dor app", &diagnosis.app_url, &diagnosis.app);

            match diagnosis.communication {
                Some(Ok(ref response)) if response.success => {
                    println!("  {} Communication test", "✓".green());
                    print_send(response);
                }
                Some(Ok(ref response)) => {
                    println!("  {} Communication test", "✗".red());
                    print_send(response);
                }
                Some(Err(ref e)) => println!("  {} Communication test: {}", "✗".red(), e),
                None => println!("  {} Communication test skipped", "-".yellow()),
            }

            if !diagnosis.all_ok() {
                println!();
                println!("{}", "Hints:".yellow().bold());
                if !diagnosis.harness.is_up() {
                    println!("  Start the harness with: dor-tester serve");
                }
                if !diagnosis.app.is_up() {
                    println!("  Start the Dor app and check DOR_APP_URL");
                }
                anyhow::bail!("Diagnostics found problems");
            }
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            report::generate_report(&results, &format, output.as_deref())?;
        }
    }

    Ok(())
}

fn status_icon(status: StepStatus) -> colored::ColoredString {
    match status {
        StepStatus::Passed => "✓".green(),
        StepStatus::Failed => "✗".red(),
        StepStatus::Error => "!".red().bold(),
    }
}

fn print_step(result: &StepResult) {
    println!(
        "  {} {} ({}ms)",
        status_icon(result.status),
        result.step,
        result.duration_ms
    );
    if let Some(ref reply) = result.reply {
        println!("    {} {}", "←".dimmed(), reply.content.dimmed());
    }
    if let Some(ref booking) = result.booking {
        println!("    {}", booking.describe().cyan());
    }
    if let Some(ref error) = result.error {
        println!("    {}", error.red());
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{} {}", "Scenario:".bold(), summary.scenario);
    for result in &summary.results {
        print_step(result);
    }
    for step in &summary.not_run {
        println!("  {} {} (not run)", "-".yellow(), step.dimmed());
    }

    println!();
    println!(
        "{} {} passed, {} failed, {} errors, {} not run in {}ms",
        "Summary:".bold(),
        summary.passed.to_string().green(),
        summary.failed.to_string().red(),
        summary.errors.to_string().red(),
        summary.not_run.len().to_string().yellow(),
        summary.duration_ms
    );
    if summary.aborted {
        println!("{} Run aborted: the Dor app stopped answering", "⚠".yellow());
    }
}

fn print_suite(suite: &SuiteReport) {
    for run in &suite.scenarios {
        print_summary(run);
    }
    println!();
    println!(
        "{} {}/{} steps passed across {} scenario(s)",
        "Total:".bold(),
        suite.passed,
        suite.total,
        suite.scenarios.len()
    );
}

fn print_send(response: &SendResponse) {
    let icon = if response.success { "✓".green() } else { "✗".red() };
    println!("  {} {}", icon, response.test);
    if let Some(ref reply) = response.dor_app_response {
        println!("    {} {}", "←".dimmed(), reply.content);
    }
    if !response.test_mode {
        println!("    {}", "reply is a fallback, not from test mode".yellow());
    }
    if let Some(ref error) = response.error {
        println!("    {}", error.red());
    }
}

fn print_reachability(label: &str, url: &str, state: &Reachability) {
    match state {
        Reachability::Up { status } => {
            println!("  {} {} {} (HTTP {})", "✓".green(), label, url.cyan(), status)
        }
        Reachability::Down { code } => {
            println!("  {} {} {} ({})", "✗".red(), label, url.cyan(), code)
        }
    }
}
