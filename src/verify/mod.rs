//! Booking verification against the Dor data store
//!
//! After a booking conversation the verifier looks for the newest matching
//! appointment, either through Supabase's REST API or a direct SQL connection.

pub mod rest;
pub mod sql;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::utils::config::{HarnessConfig, StoreTarget};

pub use rest::RestStore;
pub use sql::SqlStore;

/// Which appointment counts as the booking just made
#[derive(Debug, Clone, PartialEq)]
pub struct BookingCriteria {
    pub subject_id: String,
    pub service_id: String,
    pub provider_id: String,
    /// Earliest accepted slot start
    pub not_before: NaiveDate,
}

impl BookingCriteria {
    pub fn from_config(config: &HarnessConfig, not_before: NaiveDate) -> Self {
        Self {
            subject_id: config.booking.user_id.clone(),
            service_id: config.booking.service_id.clone(),
            provider_id: config.booking.provider_id.clone(),
            not_before,
        }
    }

    /// Criteria with today's date as lower bound
    pub fn today(config: &HarnessConfig) -> Self {
        Self::from_config(config, chrono::Local::now().date_naive())
    }

    pub fn not_before_str(&self) -> String {
        self.not_before.format("%Y-%m-%d").to_string()
    }
}

/// The matched appointment with display names joined in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub appointment_id: String,
    pub user_id: Option<String>,
    pub service_id: Option<String>,
    pub provider_id: Option<String>,
    pub slot_start: Option<String>,
    pub slot_end: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub service_name: Option<String>,
    pub user_name: Option<String>,
    pub provider_name: Option<String>,
}

impl BookingRecord {
    /// One-line description for logs and step results
    pub fn describe(&self) -> String {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".to_string());
        format!(
            "appointment {} for {} with {} ({}) at {} [{}]",
            self.appointment_id,
            or_unknown(&self.user_name),
            or_unknown(&self.provider_name),
            or_unknown(&self.service_name),
            or_unknown(&self.slot_start),
            or_unknown(&self.status),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Found(BookingRecord),
    NotFound { reason: String },
}

/// The data store could not be queried
#[derive(Debug, Error)]
pub enum StoreQueryError {
    #[error("data store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("data store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode data store response: {0}")]
    Decode(String),

    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read access to appointments
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Newest appointment matching the criteria, if any
    async fn find_latest(
        &self,
        criteria: &BookingCriteria,
    ) -> Result<Option<BookingRecord>, StoreQueryError>;

    fn describe(&self) -> String;
}

pub struct Verifier {
    store: Box<dyn BookingStore>,
}

impl Verifier {
    pub fn new(store: Box<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Open the backend the target points at
    pub async fn connect(target: &StoreTarget, timeout: Duration) -> Result<Self, StoreQueryError> {
        let store: Box<dyn BookingStore> = match target {
            StoreTarget::Rest { url, api_key } => Box::new(RestStore::new(url, api_key, timeout)?),
            StoreTarget::Sql { database_url } => Box::new(SqlStore::connect(database_url).await?),
        };
        log::debug!("Verifier using {}", store.describe());
        Ok(Self::new(store))
    }

    pub async fn verify(&self, criteria: &BookingCriteria) -> Result<Verification, StoreQueryError> {
        log::info!(
            "Verifying booking: user={}, service={}, provider={}, from={}",
            criteria.subject_id,
            criteria.service_id,
            criteria.provider_id,
            criteria.not_before_str()
        );

        match self.store.find_latest(criteria).await? {
            Some(record) => {
                log::info!("Found {}", record.describe());
                Ok(Verification::Found(record))
            }
            None => {
                let reason = format!(
                    "no appointment found for user {}, service {}, provider {} from {}",
                    criteria.subject_id,
                    criteria.service_id,
                    criteria.provider_id,
                    criteria.not_before_str()
                );
                log::warn!("{}", reason);
                Ok(Verification::NotFound { reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStore(Option<BookingRecord>);

    #[async_trait]
    impl BookingStore for FixedStore {
        async fn find_latest(
            &self,
            _criteria: &BookingCriteria,
        ) -> Result<Option<BookingRecord>, StoreQueryError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    fn criteria() -> BookingCriteria {
        BookingCriteria::from_config(
            &HarnessConfig::default(),
            NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_no_row_is_not_found() {
        let verifier = Verifier::new(Box::new(FixedStore(None)));
        match verifier.verify(&criteria()).await.unwrap() {
            Verification::NotFound { reason } => {
                assert!(reason.contains("test-user-id"));
                assert!(reason.contains("2026-10-17"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_row_is_found() {
        let record = BookingRecord {
            appointment_id: "42".to_string(),
            user_id: Some("test-user-id".to_string()),
            service_id: None,
            provider_id: None,
            slot_start: Some("2026-10-18T09:00:00".to_string()),
            slot_end: None,
            status: Some("confirmed".to_string()),
            created_at: None,
            service_name: Some("Haircut".to_string()),
            user_name: Some("John Doe".to_string()),
            provider_name: None,
        };
        let verifier = Verifier::new(Box::new(FixedStore(Some(record.clone()))));
        let outcome = verifier.verify(&criteria()).await.unwrap();
        assert_eq!(outcome, Verification::Found(record.clone()));
        assert_eq!(
            record.describe(),
            "appointment 42 for John Doe with unknown (Haircut) at 2026-10-18T09:00:00 [confirmed]"
        );
    }
}
