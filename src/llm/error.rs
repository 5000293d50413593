//! Typed errors for backend operations
//!
//! Structured error types so callers can distinguish failure modes
//! (bad configuration, rate limiting, transport trouble) without string
//! matching. Only the configuration variants ever escape the
//! orchestration core; everything else is absorbed into turn metadata.

use thiserror::Error;

/// Backend and configuration errors with typed variants
///
/// - `UnsupportedProvider` / `MissingApiKey` - configuration; fail fast at construction
/// - `Unauthorized` (401) - credential rejected by the backend
/// - `RateLimited` (429) - quota exceeded; retry after delay
/// - `BadRequest` (400) - malformed request; caller error, do not retry
/// - `ServiceError` (5xx) - server-side issue; retryable
/// - `Network` - connection/timeout; retryable
/// - `MalformedResponse` - payload did not match the backend's documented shape
/// - `Other` - catch-all
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider identifier not in the supported set
    ///
    /// Raised by the factory before any network activity.
    #[error("Unsupported provider: '{0}' (expected anthropic, openai, or ollama)")]
    UnsupportedProvider(String),

    /// A non-local backend was selected without a credential
    ///
    /// Checked at construction; never deferred to the first request.
    #[error("Missing API key for provider '{provider}' (set {env_var} or configure api_key)")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },

    /// Credential rejected by the backend (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Malformed request (HTTP 400)
    ///
    /// Indicates a bug in the adapter or invalid caller parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side error (HTTP 5xx)
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Network connectivity issue (connection refused, timeout, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Response payload did not parse as the backend's documented shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Other errors not fitting the above categories
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether a transient retry (after a short delay) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_) | LlmError::ServiceError(_) | LlmError::Network(_)
        )
    }

    /// Whether this is a configuration error, the only category allowed
    /// to propagate out of the orchestration core.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LlmError::UnsupportedProvider(_) | LlmError::MissingApiKey { .. }
        )
    }

    /// Convert an HTTP status code and error body into a typed error.
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            401 => LlmError::Unauthorized(error_text),
            429 => LlmError::RateLimited(error_text),
            400 => LlmError::BadRequest(error_text),
            500..=599 => LlmError::ServiceError(error_text),
            _ => LlmError::Other(anyhow::anyhow!("HTTP {}: {}", status, error_text)),
        }
    }

    /// Convert transport-level failures into a typed error.
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LlmError::Network(format!("Connection failed: {}", e))
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else if e.is_decode() {
            LlmError::MalformedResponse(e.to_string())
        } else {
            LlmError::Other(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_not_retryable() {
        let err = LlmError::UnsupportedProvider("grok".to_string());
        assert!(!err.is_retryable());
        assert!(err.is_configuration());

        let err = LlmError::MissingApiKey {
            provider: "openai",
            env_var: "OPENAI_API_KEY",
        };
        assert!(!err.is_retryable());
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rate_limited_is_retryable() {
        let err = LlmError::RateLimited("quota exceeded".to_string());
        assert!(err.is_retryable());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_unauthorized_not_retryable() {
        // A rejected key will not start working on its own
        let err = LlmError::Unauthorized("invalid x-api-key".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_bad_request_not_retryable() {
        let err = LlmError::BadRequest("invalid parameter".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_http_status() {
        let err = LlmError::from_http_status(
            reqwest::StatusCode::UNAUTHORIZED,
            "Invalid token".to_string(),
        );
        assert!(matches!(err, LlmError::Unauthorized(_)));

        let err = LlmError::from_http_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded".to_string(),
        );
        assert!(matches!(err, LlmError::RateLimited(_)));

        let err =
            LlmError::from_http_status(reqwest::StatusCode::BAD_REQUEST, "Bad request".to_string());
        assert!(matches!(err, LlmError::BadRequest(_)));

        let err = LlmError::from_http_status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "Server error".to_string(),
        );
        assert!(matches!(err, LlmError::ServiceError(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LlmError::MissingApiKey {
            provider: "anthropic",
            env_var: "ANTHROPIC_API_KEY",
        };
        assert!(err.to_string().contains("anthropic"));
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));

        let err = LlmError::RateLimited("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Rate limited: quota exceeded");
    }

    #[test]
    fn test_convert_to_anyhow() {
        let llm_err = LlmError::UnsupportedProvider("test".to_string());
        let anyhow_err: anyhow::Error = llm_err.into();
        assert!(anyhow_err.to_string().contains("Unsupported provider"));
    }
}
