//! YAML scenario files

pub mod types;
pub mod yaml;

pub use yaml::{parse_scenario_file, LoadedScenario};
