use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// What a reply's text content must satisfy for a step to pass
#[derive(Clone)]
pub enum Expectation {
    /// Every pattern appears (case-insensitive substring)
    ContainsAll(Vec<String>),
    /// At least one pattern appears (case-insensitive substring)
    ContainsAny(Vec<String>),
    /// Regex match anywhere in the content
    Matches(Regex),
    /// Every nested expectation holds
    AllOf(Vec<Expectation>),
    Custom { label: String, predicate: Predicate },
}

/// Outcome of one labelled predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub label: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub passed: bool,
    pub label: String,
    pub checks: Vec<Check>,
}

impl Evaluation {
    /// Failure text naming the expectation and the checks that did not hold
    pub fn describe_failure(&self) -> String {
        let failed: Vec<&str> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.label.as_str())
            .collect();
        format!(
            "expectation not met: {} (failed: {})",
            self.label,
            failed.join(", ")
        )
    }
}

impl Expectation {
    pub fn contains_all<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expectation::ContainsAll(patterns.into_iter().map(Into::into).collect())
    }

    pub fn contains_any<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expectation::ContainsAny(patterns.into_iter().map(Into::into).collect())
    }

    /// Case-insensitive regex
    pub fn matches(pattern: &str) -> Result<Self, regex::Error> {
        let re = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Expectation::Matches(re))
    }

    pub fn custom<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Expectation::Custom {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Expectation::ContainsAll(p) => format!("contains all of [{}]", p.join(", ")),
            Expectation::ContainsAny(p) => format!("contains any of [{}]", p.join(", ")),
            Expectation::Matches(re) => format!("matches /{}/i", re.as_str()),
            Expectation::AllOf(items) => items
                .iter()
                .map(|e| e.label())
                .collect::<Vec<_>>()
                .join(" AND "),
            Expectation::Custom { label, .. } => label.clone(),
        }
    }

    pub fn evaluate(&self, text: &str) -> Evaluation {
        let lower = text.to_lowercase();
        let (passed, checks) = self.collect_checks(text, &lower);
        Evaluation {
            passed,
            label: self.label(),
            checks,
        }
    }

    fn collect_checks(&self, text: &str, lower: &str) -> (bool, Vec<Check>) {
        match self {
            Expectation::ContainsAll(patterns) => {
                let checks = contains_checks(patterns, lower);
                (checks.iter().all(|c| c.passed), checks)
            }
            Expectation::ContainsAny(patterns) => {
                let checks = contains_checks(patterns, lower);
                (checks.iter().any(|c| c.passed), checks)
            }
            Expectation::Matches(re) => {
                let passed = re.is_match(text);
                (
                    passed,
                    vec![Check {
                        label: format!("matches /{}/i", re.as_str()),
                        passed,
                    }],
                )
            }
            Expectation::AllOf(items) => {
                let mut all_passed = true;
                let mut checks = Vec::new();
                for item in items {
                    let (passed, mut nested) = item.collect_checks(text, lower);
                    all_passed &= passed;
                    checks.append(&mut nested);
                }
                (all_passed, checks)
            }
            Expectation::Custom { label, predicate } => {
                let passed = predicate(text);
                (
                    passed,
                    vec![Check {
                        label: label.clone(),
                        passed,
                    }],
                )
            }
        }
    }
}

fn contains_checks(patterns: &[String], lower: &str) -> Vec<Check> {
    patterns
        .iter()
        .map(|p| Check {
            label: format!("contains '{}'", p),
            passed: lower.contains(&p.to_lowercase()),
        })
        .collect()
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expectation({})", self.label())
    }
}
