use super::types::RunReport;
use crate::runner::state::{StepResult, StepStatus};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(ms: u64) -> String {
    (ms as f64 / 1000.0).to_string()
}

/// Generate JUnit XML: one test case per step, not-run steps as skipped
pub fn generate_junit_xml(report: &RunReport) -> Result<String> {
    let summary = &report.summary;
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let tests = summary.total.to_string();
    let failures = summary.failed.to_string();
    let errors = summary.errors.to_string();
    let skipped = summary.not_run.len().to_string();
    let time = seconds(summary.duration_ms);

    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "dor-tester-run"));
    suites_start.push_attribute(("tests", tests.as_str()));
    suites_start.push_attribute(("failures", failures.as_str()));
    suites_start.push_attribute(("errors", errors.as_str()));
    suites_start.push_attribute(("skipped", skipped.as_str()));
    suites_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites_start))?;

    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", summary.scenario.as_str()));
    suite_start.push_attribute(("tests", tests.as_str()));
    suite_start.push_attribute(("failures", failures.as_str()));
    suite_start.push_attribute(("errors", errors.as_str()));
    suite_start.push_attribute(("skipped", skipped.as_str()));
    suite_start.push_attribute(("id", report.session_id.as_str()));
    suite_start.push_attribute(("time", time.as_str()));
    suite_start.push_attribute(("timestamp", report.generated_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for result in &summary.results {
        write_test_case(&mut writer, &summary.scenario, result)?;
    }
    for step in &summary.not_run {
        write_skipped_case(&mut writer, &summary.scenario, step)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    scenario: &str,
    result: &StepResult,
) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", result.step.as_str()));
    case_start.push_attribute(("classname", scenario));
    case_start.push_attribute(("time", seconds(result.duration_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    let element = match result.status {
        StepStatus::Passed => None,
        StepStatus::Failed => Some(("failure", "AssertionError")),
        StepStatus::Error => Some(("error", "NetworkError")),
    };

    if let Some((tag, kind)) = element {
        let message = result.error.as_deref().unwrap_or("Unknown error");
        let mut start = BytesStart::new(tag);
        start.push_attribute(("message", message));
        start.push_attribute(("type", kind));
        writer.write_event(Event::Start(start))?;
        writer.write_event(Event::Text(BytesText::new(message)))?;
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
    }

    if let Some(ref reply) = result.reply {
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new(&reply.content)))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

fn write_skipped_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    scenario: &str,
    step: &str,
) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", step));
    case_start.push_attribute(("classname", scenario));
    case_start.push_attribute(("time", "0"));
    writer.write_event(Event::Start(case_start))?;

    let mut skipped = BytesStart::new("skipped");
    skipped.push_attribute(("message", "run aborted"));
    writer.write_event(Event::Empty(skipped))?;

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write `junit.xml` into the output directory
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(report)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::RunSummary;
    use crate::simulator::ReplyContent;

    #[test]
    fn test_generate_junit_xml() {
        let summary = RunSummary::from_results(
            "test-session",
            "booking",
            vec![
                StepResult::passed("Start conversation", "Hi")
                    .with_reply(ReplyContent::text("Welcome! Please enter your name:"), true),
                StepResult::failed("Enter name", "John Doe", "expectation not met: matches /menu|book/i"),
                StepResult::error("Select booking", "1", "ECONNREFUSED: connection refused"),
            ],
            vec!["Select service".to_string()],
            3500,
        );
        let mut report = RunReport::new("http://localhost:3000", summary);
        report.generated_at = "2026-10-17 12:00:00".to_string();

        let xml = generate_junit_xml(&report).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="dor-tester-run""#));
        assert!(xml.contains(r#"tests="4""#));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"errors="1""#));
        assert!(xml.contains(r#"skipped="1""#));
        assert!(xml.contains(r#"<testcase name="Start conversation" classname="booking""#));
        assert!(xml.contains(r#"<error message="ECONNREFUSED: connection refused""#));
        assert!(xml.contains(r#"<skipped message="run aborted"/>"#));
        assert!(xml.contains("Welcome! Please enter your name:"));
    }
}
