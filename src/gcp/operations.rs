//! Long-running operations
//!
//! Mutating Compute Engine calls return an `Operation` resource instead of the
//! changed resource. Callers poll the operation's `selfLink` until its status
//! is `DONE`, then inspect `error` to learn whether the change succeeded.

use super::client::GcpClient;
use crate::error::{DclError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;

/// Terminal operation status
pub const STATUS_DONE: &str = "DONE";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OperationErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

/// A Compute Engine operation
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOperation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub insert_time: Option<String>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl ComputeOperation {
    /// Parse an operation from an API response body
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }

    pub fn inserted_at(&self) -> Option<DateTime<Utc>> {
        self.insert_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Turn a finished operation's error list into a [`DclError`]
    pub fn check_error(&self) -> Result<()> {
        let Some(error) = &self.error else {
            return Ok(());
        };
        if error.errors.is_empty() {
            return Ok(());
        }
        let message = error
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join(", ");
        Err(DclError::OperationFailed {
            name: self.name.clone(),
            message,
        })
    }

    /// Poll until the operation is done or the client timeout elapses
    pub async fn wait(mut self, client: &GcpClient, default_base: &str) -> Result<Self> {
        let started = Instant::now();
        let timeout = client.config.timeout;

        while !self.is_done() {
            let Some(self_link) = self.self_link.clone() else {
                return Err(DclError::OperationFailed {
                    name: self.name.clone(),
                    message: "operation has no selfLink to poll".to_string(),
                });
            };

            if started.elapsed() >= timeout {
                return Err(DclError::Timeout(timeout));
            }

            tokio::time::sleep(client.config.poll_interval).await;

            let url = client.rebase_url(&self_link, default_base);
            let value = client.get(&url).await?;
            self = Self::from_value(&value)?;
            tracing::debug!("operation {} status {}", self.name, self.status);
        }

        if let Some(inserted) = self.inserted_at() {
            let elapsed = Utc::now().signed_duration_since(inserted);
            tracing::debug!(
                "operation {} finished after ~{}s",
                self.name,
                elapsed.num_seconds()
            );
        }

        self.check_error()?;
        Ok(self)
    }
}
