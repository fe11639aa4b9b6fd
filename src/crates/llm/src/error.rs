//! Error types for the `LanguageModel` port.

use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors a `LanguageModel` implementation can return.
///
/// No concrete provider adapter lives in this crate (see the crate-level
/// docs), so this enum covers the shape of failure a caller needs to react
/// to generically: is it worth retrying, is it an auth/config problem, or is
/// it something else entirely.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The underlying transport failed (connection reset, DNS, TLS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The provider responded with a 5xx or an explicit rate-limit signal.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The provider responded with a 429 / rate-limit error.
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The call did not complete before its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Authentication with the provider failed.
    #[error("authentication failed: {0}")]
    AuthenticationError(String),

    /// The requested model is unknown or unavailable.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The request itself was malformed (bad prompt bundle, unsupported config).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider's response could not be parsed into a `GenerationResponse`.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Failed to serialize/deserialize a request or response body.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Generic error with context, for anything that doesn't fit above.
    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether a caller should retry this error with backoff.
    ///
    /// Mirrors the orchestrator's own `classify_error`: network blips,
    /// 5xx-style unavailability, rate limits, and timeouts are transient;
    /// everything else (auth, bad request, unknown model) is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_)
                | LlmError::ServiceUnavailable(_)
                | LlmError::RateLimitExceeded(_)
                | LlmError::Timeout(_)
        )
    }

    /// Whether this error stems from authentication/credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, LlmError::AuthenticationError(_))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::SerializationError(err.to_string())
    }
}

impl From<LlmError> for langgraph_core::error::GraphError {
    fn from(err: LlmError) -> Self {
        langgraph_core::error::GraphError::Custom(err.to_string())
    }
}
