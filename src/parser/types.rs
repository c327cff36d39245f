use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scenario file as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioFile {
    pub name: String,

    /// Sender phone number for every step without its own
    #[serde(default)]
    pub sender: Option<String>,

    /// Extra `${name}` variables available to step inputs
    #[serde(default)]
    pub vars: HashMap<String, String>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    #[serde(default)]
    pub name: Option<String>,

    /// Plain text to send
    #[serde(default)]
    pub send: Option<String>,

    /// Interactive selection to send instead of text
    #[serde(default)]
    pub select: Option<SelectSpec>,

    #[serde(default)]
    pub sender: Option<String>,

    pub expect: ExpectationSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSpec {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub kind: SelectKindSpec,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SelectKindSpec {
    #[default]
    List,
    Button,
}

/// Reply expectation. Several keys in one block must all hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationSpec {
    #[serde(default)]
    pub contains_all: Option<Vec<String>>,

    #[serde(default)]
    pub contains_any: Option<Vec<String>>,

    /// Case-insensitive regex
    #[serde(default)]
    pub matches: Option<String>,

    #[serde(default)]
    pub all_of: Option<Vec<ExpectationSpec>>,
}
