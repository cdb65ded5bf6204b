//! Error types for editing sessions and synthesis services.

use std::time::Duration;

/// Errors that can occur while driving an editing session.
#[derive(Debug, thiserror::Error)]
pub enum RetouchError {
    /// The selected tool requires free-text input and none was given.
    #[error("Please provide a prompt for this tool.")]
    MissingPrompt,

    /// An image-only tool was invoked while the current content is a video
    /// or nothing is loaded.
    #[error("This tool can only be used on an image.")]
    NotAnImage,

    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Billing problem reported by the API.
    #[error("billing error: {0}")]
    Billing(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Operation timed out (e.g., video polling).
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data or a data URL.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., reading or saving a file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service replied 2xx but the body was not usable.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Video generation specific error.
    #[error("video generation failed: {0}")]
    VideoGeneration(String),
}

impl RetouchError {
    /// Returns true for errors detected locally, before any service call.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::MissingPrompt | Self::NotAnImage)
    }

    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Timeout(_) => Some(Duration::from_secs(1)),
            Self::Network(_) => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    /// Renders the error the way it is shown to the user. Usage errors are
    /// static messages; everything else is prefixed as a failed operation.
    pub fn user_message(&self) -> String {
        if self.is_usage() {
            self.to_string()
        } else {
            format!("Operation failed: {}", self)
        }
    }
}

/// Result type alias for session and service operations.
pub type Result<T> = std::result::Result<T, RetouchError>;

/// Error body substring the API returns for a stale or revoked key.
pub(crate) const STALE_KEY_SIGNATURE: &str = "Requested entity was not found";

/// Reads a `Retry-After` header in seconds, if present and parseable.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Reduces an API error body to a single displayable line. Pulls
/// `error.message` out of JSON bodies and truncates anything unwieldy.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    const MAX_LEN: usize = 300;

    let message = serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| text.trim().to_string());

    if message.chars().count() > MAX_LEN {
        let truncated: String = message.chars().take(MAX_LEN).collect();
        format!("{}...", truncated)
    } else {
        message
    }
}
