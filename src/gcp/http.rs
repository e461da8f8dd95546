//! HTTP utilities for GCP REST API calls

use crate::error::{DclError, Result};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Maximum length of an API error message kept in [`DclError::Api`]
const MAX_ERROR_MESSAGE_LENGTH: usize = 300;

/// Default User-Agent header
pub const DEFAULT_USER_AGENT: &str = concat!("gdcl/", env!("CARGO_PKG_VERSION"));

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = floor_char_boundary(body, MAX_LOG_BODY_LENGTH);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Pull `error.message` out of a Google API error body, falling back to the
/// sanitized raw body
pub fn extract_error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| sanitize_for_log(body));

    message.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect()
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }

    /// Send a request and decode the JSON response body.
    /// Empty bodies decode to `Value::Null`.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            if status == StatusCode::NOT_FOUND {
                tracing::debug!("API error: {} - {}", status, sanitize_for_log(&response_body));
            } else {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            }
            return Err(DclError::from_status(
                status,
                extract_error_message(&response_body),
            ));
        }

        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&response_body)?)
    }
}

/// Format a GCP API error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_gcp_error(error: &DclError) -> String {
    match error {
        DclError::Api { status: 403, .. } => {
            "Permission denied. Check your GCP IAM permissions.".to_string()
        },
        DclError::Api { status: 401, .. } | DclError::Auth(_) => {
            "Authentication failed. Run 'gcloud auth application-default login'.".to_string()
        },
        DclError::NotFound(_) => "Resource not found.".to_string(),
        DclError::Api { status: 429, .. } => {
            "Rate limit exceeded. Please try again later.".to_string()
        },
        DclError::Api { status: 400, message } => format!(
            "Invalid request: {}",
            message.chars().take(120).collect::<String>()
        ),
        DclError::Api { status: 500 | 502 | 503 | 504, .. } => {
            "GCP service temporarily unavailable. Please try again.".to_string()
        },
        DclError::Api { status: 409, .. } => {
            "Resource conflict. The resource may already exist or be in use.".to_string()
        },
        other => {
            let error_str = other.to_string();
            let sanitized = error_str
                .chars()
                .filter(|c| c.is_ascii_graphic() || *c == ' ')
                .take(200)
                .collect::<String>();

            if sanitized.len() < error_str.len() {
                format!("{}...", sanitized)
            } else {
                sanitized
            }
        },
    }
}
