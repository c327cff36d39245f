use crate::runner::state::RunSummary;
use serde::{Deserialize, Serialize};

/// Saved outcome of one harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub session_id: String,
    pub app_url: String,
    pub summary: RunSummary,
    pub generated_at: String,
}

impl RunReport {
    pub fn new(app_url: &str, summary: RunSummary) -> Self {
        Self {
            session_id: summary.session_id.clone(),
            app_url: app_url.to_string(),
            summary,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}
