use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while assembling the harness configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },

    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Harness configuration
///
/// Values come from an optional YAML file first and are then overridden by
/// process environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    /// Base URL of the Dor app (the webhook lives at `{app_url}/webhook`)
    pub app_url: String,

    /// Base URL of a running harness server (used by the control commands)
    pub harness_url: String,

    /// Port the harness server listens on
    pub port: u16,

    /// Default simulated sender phone number
    pub sender: String,

    /// Simulated WhatsApp `phone_number_id`
    pub channel_id: String,

    /// Name typed in during onboarding
    pub user_name: String,

    pub tenant_id: Option<String>,

    pub timeouts: Timeouts,
    pub store: StoreConfig,
    pub booking: BookingIds,
    pub patterns: Patterns,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3000".to_string(),
            harness_url: "http://localhost:4000".to_string(),
            port: 4000,
            sender: "1234567890".to_string(),
            channel_id: "123456789".to_string(),
            user_name: "John Doe".to_string(),
            tenant_id: None,
            timeouts: Timeouts::default(),
            store: StoreConfig::default(),
            booking: BookingIds::default(),
            patterns: Patterns::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    /// Wait between scripted messages
    pub message_wait_ms: u64,
    /// Wait before querying the data store
    pub database_wait_ms: u64,
    /// HTTP request timeout
    pub request_timeout_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            message_wait_ms: 1000,
            database_wait_ms: 2000,
            request_timeout_ms: 15000,
        }
    }
}

/// Data store endpoints and credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Supabase project URL
    pub url: Option<String>,
    /// Supabase anon (or service) key
    pub anon_key: Option<String>,
    /// Direct SQL connection string; takes precedence over the REST API
    pub database_url: Option<String>,
}

/// How the verifier reaches the data store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreTarget {
    Rest { url: String, api_key: String },
    Sql { database_url: String },
}

/// Database ids the booking verification looks for
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingIds {
    pub user_id: String,
    pub service_id: String,
    pub provider_id: String,
    pub location_id: String,
}

impl Default for BookingIds {
    fn default() -> Self {
        Self {
            user_id: "test-user-id".to_string(),
            service_id: "test-service-id".to_string(),
            provider_id: "test-provider-id".to_string(),
            location_id: "test-location-id".to_string(),
        }
    }
}

/// Expected reply patterns (case-insensitive regexes) for each booking step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Patterns {
    pub onboarding: String,
    pub main_menu: String,
    pub service_list: String,
    pub location_list: String,
    pub provider_list: String,
    pub date_list: String,
    pub time_list: String,
    pub booking_confirmation: String,
}

impl Default for Patterns {
    fn default() -> Self {
        Self {
            onboarding: "welcome|name".to_string(),
            main_menu: "menu|book".to_string(),
            service_list: "service|choose".to_string(),
            location_list: "location|choose".to_string(),
            provider_list: "provider|choose".to_string(),
            date_list: "date|choose".to_string(),
            time_list: "time|slot".to_string(),
            booking_confirmation: "confirmed|appointment".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
                    path: p.display().to_string(),
                    source,
                })?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Override fields from environment-style lookups. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DOR_APP_URL") {
            self.app_url = v;
        }
        if let Some(v) = get("HARNESS_URL") {
            self.harness_url = v;
        }
        if let Some(v) = get("HARNESS_PORT") {
            self.port = parse_number("HARNESS_PORT", &v)?;
        }
        if let Some(v) = get("TEST_PHONE_NUMBER") {
            self.sender = v;
        }
        if let Some(v) = get("TEST_PHONE_ID") {
            self.channel_id = v;
        }
        if let Some(v) = get("TEST_USER_NAME") {
            self.user_name = v;
        }
        if let Some(v) = get("TEST_TENANT_ID") {
            self.tenant_id = Some(v);
        }
        if let Some(v) = get("TEST_USER_ID") {
            self.booking.user_id = v;
        }
        if let Some(v) = get("TEST_SERVICE_ID") {
            self.booking.service_id = v;
        }
        if let Some(v) = get("TEST_PROVIDER_ID") {
            self.booking.provider_id = v;
        }
        if let Some(v) = get("TEST_LOCATION_ID") {
            self.booking.location_id = v;
        }
        if let Some(v) = get("SUPABASE_URL") {
            self.store.url = Some(v);
        }
        if let Some(v) = get("SUPABASE_ANON_KEY") {
            self.store.anon_key = Some(v);
        }
        if let Some(v) = get("DATABASE_URL") {
            self.store.database_url = Some(v);
        }
        if let Some(v) = get("STEP_DELAY_MS") {
            self.timeouts.message_wait_ms = parse_number("STEP_DELAY_MS", &v)?;
        }
        if let Some(v) = get("VERIFY_DELAY_MS") {
            self.timeouts.database_wait_ms = parse_number("VERIFY_DELAY_MS", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            self.timeouts.request_timeout_ms = parse_number("REQUEST_TIMEOUT_MS", &v)?;
        }

        Ok(())
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.timeouts.message_wait_ms)
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.timeouts.database_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_timeout_ms)
    }

    /// Resolve the data store target, failing when credentials are absent
    pub fn require_store(&self) -> Result<StoreTarget, ConfigError> {
        if let Some(ref database_url) = self.store.database_url {
            return Ok(StoreTarget::Sql {
                database_url: database_url.clone(),
            });
        }

        match (&self.store.url, &self.store.anon_key) {
            (Some(url), Some(key)) => Ok(StoreTarget::Rest {
                url: url.clone(),
                api_key: key.clone(),
            }),
            (url, key) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push("SUPABASE_URL".to_string());
                }
                if key.is_none() {
                    missing.push("SUPABASE_ANON_KEY".to_string());
                }
                Err(ConfigError::Missing(missing))
            }
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.app_url, "http://localhost:3000");
        assert_eq!(config.port, 4000);
        assert_eq!(config.step_delay(), Duration::from_millis(1000));
        assert_eq!(config.request_timeout(), Duration::from_millis(15000));
        assert_eq!(config.patterns.time_list, "time|slot");
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
appUrl: http://dor.local:3100
userName: Jane Roe
timeouts:
  messageWaitMs: 0
booking:
  serviceId: svc-42
"#;
        let config = HarnessConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.app_url, "http://dor.local:3100");
        assert_eq!(config.user_name, "Jane Roe");
        assert_eq!(config.timeouts.message_wait_ms, 0);
        assert_eq!(config.timeouts.database_wait_ms, 2000);
        assert_eq!(config.booking.service_id, "svc-42");
        assert_eq!(config.booking.user_id, "test-user-id");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = HarnessConfig::from_yaml_str("sender: '111'").unwrap();
        config
            .apply_env(lookup(&[
                ("TEST_PHONE_NUMBER", "0535305225"),
                ("STEP_DELAY_MS", "250"),
                ("SUPABASE_URL", ""),
            ]))
            .unwrap();
        assert_eq!(config.sender, "0535305225");
        assert_eq!(config.timeouts.message_wait_ms, 250);
        assert!(config.store.url.is_none());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_env(lookup(&[("HARNESS_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "HARNESS_PORT"));
    }

    #[test]
    fn test_require_store_reports_missing_credentials() {
        let mut config = HarnessConfig::default();
        config.store.url = Some("https://project.supabase.co".to_string());

        let err = config.require_store().unwrap_err();
        assert_eq!(err.to_string(), "missing required configuration: SUPABASE_ANON_KEY");
    }

    #[test]
    fn test_require_store_prefers_database_url() {
        let mut config = HarnessConfig::default();
        config.store.url = Some("https://project.supabase.co".to_string());
        config.store.anon_key = Some("anon".to_string());
        config.store.database_url = Some("postgres://localhost/dor".to_string());

        assert_eq!(
            config.require_store().unwrap(),
            StoreTarget::Sql {
                database_url: "postgres://localhost/dor".to_string()
            }
        );
    }
}
