//! Provider failures seen by the reasoning loop
//!
//! The driver retries transient failures with backoff; everything else ends
//! the stage that issued the request.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single completion request
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Provider throttled the request; retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Provider returned HTTP {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Transport failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unusable completion: {0}")]
    InvalidResponse(String),

    #[error("No completion within {0:?}")]
    Timeout(Duration),

    #[error("Could not encode or decode provider payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider misconfigured: {0}")]
    Config(String),
}

/// Request timeout, throttling, overload (529) and server faults
fn transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 529) || (500..600).contains(&status)
}

impl LlmError {
    /// Whether the same request may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::ApiError { status, .. } => transient_status(*status),
            Self::InvalidResponse(_) | Self::Json(_) | Self::Config(_) => false,
        }
    }

    /// Wait the provider asked for, when it gave one
    pub fn retry_after(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            Some(*retry_after)
        } else {
            None
        }
    }
}
