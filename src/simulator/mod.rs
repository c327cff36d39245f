//! WhatsApp provider simulation
//!
//! Builds provider-shaped webhook envelopes and delivers them to the Dor app,
//! asking it (via the test-mode header) to echo its reply synchronously.

pub mod client;
pub mod message;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub use client::WebhookClient;
pub use message::{MessageKind, Reply, ReplyContent, SimulatedMessage, WebhookEnvelope};

/// Outcome of a delivered message
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub status: u16,
    pub reply: Reply,
}

/// Anything that can deliver a simulated message and hand back the app's reply
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, message: &SimulatedMessage) -> Result<Delivery, NetworkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    ConnectionRefused,
    Timeout,
    /// The app answered with a non-2xx status
    Status(u16),
    Transport,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkErrorKind::ConnectionRefused => write!(f, "ECONNREFUSED"),
            NetworkErrorKind::Timeout => write!(f, "ETIMEDOUT"),
            NetworkErrorKind::Status(code) => write!(f, "HTTP_{}", code),
            NetworkErrorKind::Transport => write!(f, "ENETWORK"),
        }
    }
}

/// Delivery failure
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn status(code: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("request failed with status code {}", code)
        } else {
            format!("request failed with status code {}: {}", code, body)
        };
        Self::new(NetworkErrorKind::Status(code), message)
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if let Some(status) = err.status() {
            NetworkErrorKind::Status(status.as_u16())
        } else if err.is_connect() {
            match io_error_kind(err) {
                Some(std::io::ErrorKind::ConnectionRefused) | None => {
                    NetworkErrorKind::ConnectionRefused
                }
                Some(std::io::ErrorKind::TimedOut) => NetworkErrorKind::Timeout,
                Some(_) => NetworkErrorKind::Transport,
            }
        } else {
            NetworkErrorKind::Transport
        };

        Self::new(kind, full_message(err))
    }

    /// HTTP status, when the app answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            NetworkErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// No response was received at all
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind, NetworkErrorKind::Status(_))
    }

    pub fn code(&self) -> String {
        self.kind.to_string()
    }
}

fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = cause.source();
    }
    None
}

fn full_message(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
