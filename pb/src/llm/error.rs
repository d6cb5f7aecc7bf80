//! LLM error types

use std::time::Duration;
use thiserror::Error;

use super::Protocol;

/// Errors from a single backend call
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("{protocol} protocol not supported by backend: {message}")]
    Unsupported { protocol: Protocol, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Check if the backend does not offer the requested protocol
    pub fn is_unsupported(&self) -> bool {
        matches!(self, LlmError::Unsupported { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::Unsupported { .. } => false,
            LlmError::InvalidResponse(_) => false,
            LlmError::Json(_) => false,
        }
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Phrases backends use when an endpoint or request shape is not offered
const UNSUPPORTED_MARKERS: &[&str] = &[
    "unrecognized request url",
    "unknown url",
    "unknown endpoint",
    "not supported",
    "unsupported",
    "invalid url",
];

/// Map a non-success HTTP status to an error
///
/// 404/405/501, and 400s whose body names an unknown endpoint, mean the
/// protocol is not available; those become `Unsupported` so the invoker can
/// fall back instead of failing.
pub(crate) fn error_from_status(
    protocol: Protocol,
    status: u16,
    retry_after: Option<Duration>,
    body: String,
) -> LlmError {
    if status == 429 {
        return LlmError::RateLimited {
            retry_after: retry_after.unwrap_or(Duration::from_secs(60)),
        };
    }

    let lower = body.to_lowercase();
    let unsupported =
        matches!(status, 404 | 405 | 501) || (status == 400 && UNSUPPORTED_MARKERS.iter().any(|m| lower.contains(m)));
    if unsupported {
        return LlmError::Unsupported {
            protocol,
            message: format!("HTTP {}: {}", status, body),
        };
    }

    LlmError::ApiError { status, message: body }
}

/// A generation that failed after fallback and retries were exhausted
#[derive(Debug, Error)]
#[error("generation failed via {protocol} protocol after {attempts} attempt(s): {source}")]
pub struct GenerationError {
    /// Protocol of the last attempt
    pub protocol: Protocol,
    /// Total attempts made
    pub attempts: u32,
    #[source]
    pub source: LlmError,
}
