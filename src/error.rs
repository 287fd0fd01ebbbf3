// Error types module

use std::time::Duration;

use thiserror::Error;

use crate::admission::Rejection;

/// Centralized error type for the plugin
///
/// Variants map one-to-one onto the failure kinds callers need to tell apart:
/// configuration problems, payload problems, remote API failures, and the
/// edit pipeline's own terminal states.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Missing or invalid credentials / configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed base64 image payload
    #[error("Base64 decode failed: {0}")]
    Decode(String),

    /// Non-200 status or transport failure while fetching an image
    #[error("Download failed: {0}")]
    Download(String),

    /// Remote API returned neither a URL nor inline image data
    #[error("No image data in response")]
    NoImageData,

    /// HTTP 401 from the remote API
    #[error("API key rejected: {0}")]
    Auth(String),

    /// HTTP 429 from the remote API
    #[error("Rate limited by remote API: {0}")]
    RateLimited(String),

    /// Any other non-success status from the remote API
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// Edit task submission was refused
    #[error("Edit submission failed: {0}")]
    Submission(String),

    /// Remote edit task ended in `failed` or `cancelled`
    #[error("Edit task {status}: {detail}")]
    TaskFailed { status: String, detail: String },

    /// An operation did not finish within its bound
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Response body did not have the expected shape
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Request was refused by the admission policy
    #[error("Request rejected: {0:?}")]
    AdmissionRejected(Rejection),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Host failed to deliver a reply
    #[error("Reply delivery failed: {0}")]
    Reply(String),
}

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

impl PluginError {
    /// Short guidance text suitable for showing to the chat user
    pub fn user_message(&self) -> String {
        match self {
            PluginError::Configuration(_) => "API key is not configured".to_string(),
            PluginError::Auth(_) => "API key is invalid or expired".to_string(),
            PluginError::RateLimited(_) => {
                "API quota exceeded, please try again later".to_string()
            }
            PluginError::Api { status, .. } if *status >= 500 => {
                "Image service internal error, please try again later".to_string()
            }
            PluginError::Timeout { after, .. } => format!(
                "Timed out after {}s, please try again later",
                after.as_secs()
            ),
            PluginError::NoImageData => "Generation returned no image".to_string(),
            PluginError::TaskFailed { detail, .. } => format!("Edit task failed: {}", detail),
            PluginError::AdmissionRejected(rejection) => rejection.user_message().to_string(),
            other => other.to_string(),
        }
    }

    /// Map a non-success HTTP status from the remote API onto an error kind
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => PluginError::Auth(body),
            429 => PluginError::RateLimited(body),
            _ => PluginError::Api { status, body },
        }
    }
}
