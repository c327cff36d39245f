use super::types::{ExpectationSpec, ScenarioFile, SelectKindSpec, StepSpec};
use crate::runner::{Expectation, Scenario, SelectKind, Step, StepInput};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// A scenario together with the variables its file declares
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub scenario: Scenario,
    pub vars: HashMap<String, String>,
}

/// Parse a YAML scenario file
pub fn parse_scenario_file(path: &Path) -> Result<LoadedScenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_scenario_content(&content)
        .with_context(|| format!("Invalid scenario file: {}", path.display()))
}

/// Parse YAML content into a scenario
pub fn parse_scenario_content(content: &str) -> Result<LoadedScenario> {
    let file: ScenarioFile = serde_yaml::from_str(content).context("Failed to parse YAML")?;

    if file.steps.is_empty() {
        bail!("Scenario '{}' has no steps", file.name);
    }

    let mut scenario = Scenario::new(&file.name);
    scenario.sender = file.sender;

    for (index, spec) in file.steps.into_iter().enumerate() {
        let step = build_step(index, spec)?;
        scenario.steps.push(step);
    }

    Ok(LoadedScenario {
        scenario,
        vars: file.vars,
    })
}

fn build_step(index: usize, spec: StepSpec) -> Result<Step> {
    let input = match (spec.send, spec.select) {
        (Some(text), None) => StepInput::Text(text),
        (None, Some(select)) => StepInput::Select {
            id: select.id,
            title: select.title,
            kind: match select.kind {
                SelectKindSpec::List => SelectKind::List,
                SelectKindSpec::Button => SelectKind::Button,
            },
        },
        (Some(_), Some(_)) => bail!("Step {} has both 'send' and 'select'", index + 1),
        (None, None) => bail!("Step {} needs 'send' or 'select'", index + 1),
    };

    let name = spec.name.unwrap_or_else(|| match &input {
        StepInput::Text(text) => format!("Send {}", text),
        StepInput::Select { id, .. } => format!("Select {}", id),
    });

    let expect = build_expectation(&spec.expect)
        .with_context(|| format!("Step '{}' has an invalid expectation", name))?;

    Ok(Step {
        name,
        input,
        expect,
        sender: spec.sender,
    })
}

/// Turn an expectation block into an `Expectation`
pub fn build_expectation(spec: &ExpectationSpec) -> Result<Expectation> {
    let mut parts = Vec::new();

    if let Some(ref patterns) = spec.contains_all {
        parts.push(Expectation::contains_all(patterns.iter().cloned()));
    }
    if let Some(ref patterns) = spec.contains_any {
        parts.push(Expectation::contains_any(patterns.iter().cloned()));
    }
    if let Some(ref pattern) = spec.matches {
        parts.push(
            Expectation::matches(pattern)
                .with_context(|| format!("Invalid regex: {}", pattern))?,
        );
    }
    if let Some(ref nested) = spec.all_of {
        let nested = nested
            .iter()
            .map(build_expectation)
            .collect::<Result<Vec<_>>>()?;
        parts.push(Expectation::AllOf(nested));
    }

    match parts.len() {
        0 => bail!("Expectation needs containsAll, containsAny, matches or allOf"),
        1 => Ok(parts.remove(0)),
        _ => Ok(Expectation::AllOf(parts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOKING_YAML: &str = r#"
name: returning customer
sender: "0535305225"
vars:
  serviceTitle: Haircut
steps:
  - name: Greet
    send: Hi
    expect:
      containsAny: [menu, welcome back]
  - select:
      id: service_1
      title: ${serviceTitle}
    expect:
      matches: "location|choose"
  - send: "1"
    sender: "111"
    expect:
      containsAll: [date]
      matches: "\\d"
"#;

    #[test]
    fn test_parse_scenario() {
        let loaded = parse_scenario_content(BOOKING_YAML).unwrap();
        let scenario = loaded.scenario;

        assert_eq!(scenario.name, "returning customer");
        assert_eq!(scenario.sender.as_deref(), Some("0535305225"));
        assert_eq!(scenario.len(), 3);
        assert_eq!(loaded.vars.get("serviceTitle").map(String::as_str), Some("Haircut"));

        assert_eq!(scenario.steps[0].name, "Greet");
        assert_eq!(scenario.steps[1].name, "Select service_1");
        assert_eq!(
            scenario.steps[1].input,
            StepInput::Select {
                id: "service_1".to_string(),
                title: Some("${serviceTitle}".to_string()),
                kind: SelectKind::List,
            }
        );
        assert_eq!(scenario.steps[2].sender.as_deref(), Some("111"));
    }

    #[test]
    fn test_multiple_keys_are_combined() {
        let loaded = parse_scenario_content(BOOKING_YAML).unwrap();
        let expect = &loaded.scenario.steps[2].expect;
        assert!(matches!(expect, Expectation::AllOf(parts) if parts.len() == 2));
        assert!(expect.evaluate("Pick a date: 1. Monday").passed);
        assert!(!expect.evaluate("Pick a date").passed);
    }

    #[test]
    fn test_step_needs_exactly_one_input() {
        let yaml = r#"
name: broken
steps:
  - name: nothing
    expect:
      containsAll: [hi]
"#;
        let err = parse_scenario_content(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("needs 'send' or 'select'"));
    }

    #[test]
    fn test_empty_expectation_is_rejected() {
        let yaml = r#"
name: broken
steps:
  - send: Hi
    expect: {}
"#;
        let err = parse_scenario_content(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Expectation needs"));
    }

    #[test]
    fn test_bad_regex_is_rejected() {
        let spec = ExpectationSpec {
            matches: Some("(open".to_string()),
            ..Default::default()
        };
        assert!(build_expectation(&spec).is_err());
    }
}
