use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::expect::Check;
use crate::simulator::ReplyContent;
use crate::verify::BookingRecord;

/// Step outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Passed,
    Failed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "PASSED",
            StepStatus::Failed => "FAILED",
            StepStatus::Error => "ERROR",
        }
    }
}

/// Outcome of one attempted step. Appended to the run log, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step: String,
    pub input: String,
    pub status: StepStatus,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyContent>,
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<Check>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Appointment matched by the database verification step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingRecord>,
    #[serde(default)]
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    fn new(step: &str, input: &str, status: StepStatus) -> Self {
        Self {
            step: step.to_string(),
            input: input.to_string(),
            status,
            success: status == StepStatus::Passed,
            reply: None,
            test_mode: false,
            checks: Vec::new(),
            error: None,
            booking: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn passed(step: &str, input: &str) -> Self {
        Self::new(step, input, StepStatus::Passed)
    }

    pub fn failed(step: &str, input: &str, error: impl Into<String>) -> Self {
        let mut result = Self::new(step, input, StepStatus::Failed);
        result.error = Some(error.into());
        result
    }

    pub fn error(step: &str, input: &str, error: impl Into<String>) -> Self {
        let mut result = Self::new(step, input, StepStatus::Error);
        result.error = Some(error.into());
        result
    }

    pub fn with_reply(mut self, reply: ReplyContent, test_mode: bool) -> Self {
        self.reply = Some(reply);
        self.test_mode = test_mode;
        self
    }

    pub fn with_checks(mut self, checks: Vec<Check>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_booking(mut self, booking: BookingRecord) -> Self {
        self.booking = Some(booking);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// A reply kept in the run's capture list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedReply {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub response: ReplyContent,
    pub test_mode: bool,
}

/// Outcome of one scenario run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub session_id: String,
    pub scenario: String,
    /// Number of scripted steps, attempted or not
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    /// Steps never attempted because the run aborted
    #[serde(default)]
    pub not_run: Vec<String>,
    #[serde(default)]
    pub aborted: bool,
    pub results: Vec<StepResult>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn from_results(
        session_id: &str,
        scenario: &str,
        results: Vec<StepResult>,
        not_run: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        let count = |status: StepStatus| results.iter().filter(|r| r.status == status).count();
        let passed = count(StepStatus::Passed);
        let failed = count(StepStatus::Failed);
        let errors = count(StepStatus::Error);

        Self {
            session_id: session_id.to_string(),
            scenario: scenario.to_string(),
            total: results.len() + not_run.len(),
            passed,
            failed,
            errors,
            aborted: !not_run.is_empty(),
            not_run,
            results,
            duration_ms,
        }
    }

    /// Append a step outside the scripted scenario (e.g. database verification)
    pub fn push_result(&mut self, result: StepResult) {
        match result.status {
            StepStatus::Passed => self.passed += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Error => self.errors += 1,
        }
        self.total += 1;
        self.results.push(result);
    }

    /// Record a step that could not be attempted
    pub fn push_not_run(&mut self, step: &str) {
        self.total += 1;
        self.not_run.push(step.to_string());
        self.aborted = true;
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed == 0 && self.errors == 0 && self.passed == self.total
    }
}

/// Aggregate of several scenario runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub scenarios: Vec<RunSummary>,
}

impl SuiteReport {
    pub fn from_runs(scenarios: Vec<RunSummary>) -> Self {
        let mut report = Self {
            total: 0,
            passed: 0,
            failed: 0,
            errors: 0,
            scenarios: Vec::new(),
        };
        for run in &scenarios {
            report.total += run.total;
            report.passed += run.passed;
            report.failed += run.failed;
            report.errors += run.errors;
        }
        report.scenarios = scenarios;
        report
    }
}
