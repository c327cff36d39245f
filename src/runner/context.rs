use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::state::{CapturedReply, StepResult};
use crate::simulator::Reply;
use crate::utils::config::HarnessConfig;

/// Mutable state of one harness session: captured replies, step log and variables
pub struct RunContext {
    pub session_id: String,

    /// Replies in capture order
    captures: Vec<CapturedReply>,

    /// Step outcomes in submission order
    results: Vec<StepResult>,

    /// Variables available to `${name}` substitution in step inputs
    pub vars: HashMap<String, String>,

    next_id: u64,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            captures: Vec::new(),
            results: Vec::new(),
            vars: HashMap::new(),
            next_id: 1,
        }
    }

    /// Context seeded with the configured conversation values
    pub fn from_config(config: &HarnessConfig) -> Self {
        let mut ctx = Self::new();
        ctx.set_var("userName", &config.user_name);
        ctx.set_var("sender", &config.sender);
        ctx.set_var("userId", &config.booking.user_id);
        ctx.set_var("serviceId", &config.booking.service_id);
        ctx.set_var("providerId", &config.booking.provider_id);
        ctx.set_var("locationId", &config.booking.location_id);
        if let Some(ref tenant) = config.tenant_id {
            ctx.set_var("tenantId", tenant);
        }
        ctx
    }

    /// Append the content of a reply. Malformed replies carry no content and are skipped.
    pub fn capture(&mut self, reply: &Reply) -> Option<&CapturedReply> {
        let content = reply.content()?.clone();

        let now = Utc::now();
        let timestamp = match self.captures.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let captured = CapturedReply {
            id: self.next_id,
            timestamp,
            response: content,
            test_mode: reply.is_test_mode(),
        };
        self.next_id += 1;
        self.captures.push(captured);
        self.captures.last()
    }

    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
    }

    pub fn captures(&self) -> &[CapturedReply] {
        &self.captures
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// True when at least one captured reply came from the app in test mode
    pub fn test_mode_seen(&self) -> bool {
        self.captures.iter().any(|c| c.test_mode)
    }

    /// Drop captures and results. Ids keep increasing.
    pub fn clear(&mut self) {
        self.captures.clear();
        self.results.clear();
    }

    pub fn get_var(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    pub fn set_var(&mut self, name: &str, value: &str) {
        let substituted = self.substitute_vars(value);
        self.vars.insert(name.to_string(), substituted);
    }

    /// Replace `${name}` with a variable, or with `date`/`time`/`timestamp`.
    /// Unknown names are left as written.
    pub fn substitute_vars(&self, text: &str) -> String {
        static VAR_RE: OnceLock<Regex> = OnceLock::new();
        let re = VAR_RE
            .get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").expect("variable pattern"));

        re.replace_all(text, |caps: &regex::Captures| {
            let key = &caps[1];
            if let Some(val) = self.get_var(key) {
                return val;
            }
            match key {
                "time" => chrono::Local::now().format("%H:%M:%S").to_string(),
                "date" => chrono::Local::now().format("%Y-%m-%d").to_string(),
                "timestamp" => Utc::now().timestamp().to_string(),
                _ => format!("${{{}}}", key),
            }
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{ReplyContent, SimulatedMessage};

    fn genuine(text: &str) -> Reply {
        Reply::Genuine(ReplyContent::text(text))
    }

    #[test]
    fn test_capture_assigns_increasing_ids() {
        let mut ctx = RunContext::new();
        ctx.capture(&genuine("Welcome"));
        ctx.capture(&Reply::Fallback(ReplyContent::fallback_for(
            &SimulatedMessage::text("1"),
        )));

        let captures = ctx.captures();
        assert_eq!(captures.len(), 2);
        assert!(captures[0].id < captures[1].id);
        assert!(captures[0].timestamp <= captures[1].timestamp);
        assert!(captures[0].test_mode);
        assert!(!captures[1].test_mode);
        // The genuine capture is still in place
        assert_eq!(captures[0].response.content, "Welcome");
    }

    #[test]
    fn test_malformed_reply_is_not_captured() {
        let mut ctx = RunContext::new();
        assert!(ctx
            .capture(&Reply::Malformed(serde_json::json!({"type": "text"})))
            .is_none());
        assert!(ctx.captures().is_empty());
    }

    #[test]
    fn test_clear_empties_lists_but_keeps_ids_monotonic() {
        let mut ctx = RunContext::new();
        ctx.capture(&genuine("a"));
        ctx.record(StepResult::passed("Hi", "Hi"));
        ctx.clear();
        assert!(ctx.captures().is_empty());
        assert!(ctx.results().is_empty());

        let id = ctx.capture(&genuine("b")).unwrap().id;
        assert_eq!(id, 2);
    }

    #[test]
    fn test_substitute_vars() {
        let mut ctx = RunContext::new();
        ctx.set_var("userName", "John Doe");
        assert_eq!(ctx.substitute_vars("${userName}"), "John Doe");
        assert_eq!(ctx.substitute_vars("hi ${unknownVarXyz}"), "hi ${unknownVarXyz}");
        assert_eq!(ctx.substitute_vars("${date}").len(), 10);
    }

    #[test]
    fn test_from_config_seeds_vars() {
        let ctx = RunContext::from_config(&HarnessConfig::default());
        assert_eq!(ctx.get_var("userName").as_deref(), Some("John Doe"));
        assert_eq!(ctx.get_var("serviceId").as_deref(), Some("test-service-id"));
    }
}
