// Workflow Providers - the side-effect seams action handlers call into
//
// Production implementations live in `crate::services`; tests substitute
// mockall doubles or the in-memory recorders from `crate::tests::helpers`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("rejected by provider: {0}")]
    Rejected(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },
    #[error("field '{field}' cannot be written on {kind}")]
    UnknownField { kind: String, field: String },
    #[error("operation not supported: {0}")]
    Unsupported(String),
    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        ProviderError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    /// Parsed JSON when the body is JSON, otherwise the raw text
    pub body: serde_json::Value,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ProviderError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Returns the id of the stored notification
    async fn notify(&self, recipient: &str, message: &str, severity: Severity) -> Result<Uuid, ProviderError>;
}

/// Writes to CRM records owned by the host application
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityMutator: Send + Sync {
    async fn update_field(
        &self,
        kind: &str,
        id: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<(), ProviderError>;

    async fn create(&self, kind: &str, attributes: &serde_json::Value) -> Result<Uuid, ProviderError>;

    async fn add_tag(&self, kind: &str, id: &str, tag: &str) -> Result<(), ProviderError> {
        let _ = (id, tag);
        Err(ProviderError::Unsupported(format!("tagging {} records", kind)))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookCaller: Send + Sync {
    async fn call(
        &self,
        url: &str,
        method: &str,
        headers: &HashMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<WebhookResponse, ProviderError>;
}
