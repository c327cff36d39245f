use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{BookingCriteria, BookingRecord, BookingStore, StoreQueryError};

const APPOINTMENT_SELECT: &str = "*,services(name),users(full_name),providers(full_name)";

/// Supabase PostgREST backend
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, StoreQueryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn appointments_url(&self) -> String {
        format!("{}/rest/v1/appointments", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct AppointmentRow {
    #[serde(default)]
    appointment_id: Option<Value>,
    /// Older schemas key appointments by `id`
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    service_id: Option<Value>,
    #[serde(default)]
    provider_id: Option<Value>,
    #[serde(default)]
    slot_start: Option<String>,
    #[serde(default)]
    slot_end: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    services: Option<Related>,
    #[serde(default)]
    users: Option<Related>,
    #[serde(default)]
    providers: Option<Related>,
}

/// Embedded resource from a PostgREST join
#[derive(Debug, Deserialize)]
struct Related {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TryFrom<AppointmentRow> for BookingRecord {
    type Error = StoreQueryError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let appointment_id = row
            .appointment_id
            .as_ref()
            .or(row.id.as_ref())
            .map(id_string)
            .ok_or_else(|| {
                StoreQueryError::Decode("appointment row has no appointment_id".to_string())
            })?;

        Ok(Self {
            appointment_id,
            user_id: row.user_id.as_ref().map(id_string),
            service_id: row.service_id.as_ref().map(id_string),
            provider_id: row.provider_id.as_ref().map(id_string),
            slot_start: row.slot_start,
            slot_end: row.slot_end,
            status: row.status,
            created_at: row.created_at,
            service_name: row.services.and_then(|s| s.name),
            user_name: row.users.and_then(|u| u.full_name),
            provider_name: row.providers.and_then(|p| p.full_name),
        })
    }
}

#[async_trait]
impl BookingStore for RestStore {
    async fn find_latest(
        &self,
        criteria: &BookingCriteria,
    ) -> Result<Option<BookingRecord>, StoreQueryError> {
        let response = self
            .http
            .get(self.appointments_url())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[
                ("select", APPOINTMENT_SELECT.to_string()),
                ("user_id", format!("eq.{}", criteria.subject_id)),
                ("service_id", format!("eq.{}", criteria.service_id)),
                ("provider_id", format!("eq.{}", criteria.provider_id)),
                ("slot_start", format!("gte.{}", criteria.not_before_str())),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreQueryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<AppointmentRow> =
            serde_json::from_str(&body).map_err(|e| StoreQueryError::Decode(e.to_string()))?;

        rows.into_iter().next().map(BookingRecord::try_from).transpose()
    }

    fn describe(&self) -> String {
        format!("Supabase REST at {}", self.base_url)
    }
}
