pub mod json;
pub mod junit;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

pub use types::RunReport;

/// Write `report.json` and `junit.xml` into the output directory
pub fn write_reports(report: &RunReport, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    json::generate(report, Some(&output_dir.join("report.json")))?;
    junit::write_report(report, output_dir)?;
    Ok(())
}

/// Convert a saved JSON report into another format
pub fn generate_report(results_path: &Path, format: &str, output: Option<&Path>) -> Result<()> {
    let report = json::load(results_path)?;

    match format {
        "json" => json::generate(&report, output),
        "junit" => {
            let xml = junit::generate_junit_xml(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(path, xml)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("JUnit report saved to: {}", path.display());
                }
                None => println!("{}", xml),
            }
            Ok(())
        }
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}
