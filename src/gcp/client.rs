//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication,
//! HTTP transport, retries and the per-client settings the reconciler uses.

use super::auth::GcpCredentials;
use super::http::{GcpHttpClient, DEFAULT_USER_AGENT};
use super::retry::{retry, RetryPolicy};
use crate::error::{DclError, Result};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

/// Default timeout for a whole apply / get / delete call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Settings shared by every call made through a [`GcpClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overrides every resource's API base path (e.g. a test server)
    pub base_path: Option<String>,
    /// Upper bound for one public call, including operation polling
    pub timeout: Duration,
    /// Retry policy for transient HTTP failures and 409 conflicts
    pub retry: RetryPolicy,
    /// Delay between long-running operation polls
    pub poll_interval: Duration,
    /// How many times to re-check that a deleted resource is gone
    pub delete_confirm_retries: u32,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(2),
            delete_confirm_retries: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Use `timeout` when non-zero, otherwise the configured timeout
    pub fn timeout_or(&self, timeout: Duration) -> Duration {
        if timeout.is_zero() {
            self.timeout
        } else {
            timeout
        }
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub config: ClientConfig,
}

impl GcpClient {
    /// Create a new GCP client using Application Default Credentials
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let credentials = GcpCredentials::new().await?;
        Self::with_credentials(credentials, config)
    }

    /// Create a client with explicit credentials
    pub fn with_credentials(credentials: GcpCredentials, config: ClientConfig) -> Result<Self> {
        let http = GcpHttpClient::with_user_agent(&config.user_agent)?;
        Ok(Self {
            credentials,
            http,
            config,
        })
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    /// Send a request, retrying transient failures per the client's policy
    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        retry(&self.config.retry, DclError::is_retryable, |_| {
            let method = method.clone();
            async move {
                let token = self.get_token().await?;
                match self.http.send(method.clone(), url, &token, body).await {
                    // Cached token revoked or expired early
                    Err(e) if e.status() == Some(401) => {
                        tracing::debug!("Got 401, refreshing access token");
                        let token = self.credentials.refresh_token().await?;
                        self.http.send(method, url, &token, body).await
                    },
                    other => other,
                }
            }
        })
        .await
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request(Method::GET, url, None).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::POST, url, body).await
    }

    /// Rebase an absolute URL returned by the API (operation self-links)
    /// onto the configured base path override
    pub fn rebase_url(&self, url: &str, default_base: &str) -> String {
        match &self.config.base_path {
            Some(base) => match url.strip_prefix(default_base) {
                Some(rest) => format!("{}/{}", base.trim_end_matches('/'), rest),
                None => url.to_string(),
            },
            None => url.to_string(),
        }
    }
}
