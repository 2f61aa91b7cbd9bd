//! Provider error types.

use examgrade_core::error::GradeError;
use thiserror::Error;

/// Errors that can occur when talking to a model backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A streamed chunk could not be decoded.
    #[error("malformed response stream: {0}")]
    MalformedStream(String),
}

impl From<ProviderError> for GradeError {
    fn from(e: ProviderError) -> Self {
        GradeError::ModelCall(e.to_string())
    }
}

/// Classify a transport failure from reqwest.
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failures_become_model_call_errors() {
        let err: GradeError = ProviderError::ApiError {
            status: 500,
            message: "internal error".into(),
        }
        .into();
        assert!(matches!(err, GradeError::ModelCall(_)));
        assert!(err.to_string().contains("HTTP 500"));
    }
}
