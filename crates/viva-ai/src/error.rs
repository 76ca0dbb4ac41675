//! Error types for viva-ai

use thiserror::Error;

/// Result type alias using viva-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with model providers
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Request was cancelled before completion
    #[error("Request aborted")]
    Aborted,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Context overflow / too many tokens
    #[error("Context overflow: {0}")]
    ContextOverflow(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("overloaded")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }

    /// Check if this error indicates a context overflow / too many tokens
    pub fn is_context_overflow(&self) -> bool {
        match self {
            Error::ContextOverflow(_) => true,
            Error::Api { message, .. } => {
                let msg = message.to_lowercase();
                msg.contains("too many tokens")
                    || msg.contains("context length")
                    || msg.contains("context window")
                    || msg.contains("token limit")
                    || msg.contains("prompt is too long")
                    || msg.contains("prompt too long")
                    || msg.contains("request too large")
                    || msg.contains("context_length_exceeded")
                    || msg.contains("input too long")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_typed_variant() {
        assert!(Error::RateLimited { retry_after: Some(5) }.is_retryable());
    }

    #[test]
    fn test_retryable_api_rate_limit() {
        let e = Error::api("rate_limit_error", "You have exceeded the rate limit");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_not_retryable_api_auth() {
        let e = Error::api("authentication_error", "Invalid API key");
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_overflow_typed_variant() {
        assert!(Error::ContextOverflow("too big".into()).is_context_overflow());
    }

    #[test]
    fn test_overflow_api_context_length_exceeded() {
        let e = Error::api(
            "invalid_request_error",
            "This model's maximum context length is 200000 tokens. context_length_exceeded",
        );
        assert!(e.is_context_overflow());
    }

    #[test]
    fn test_overflow_api_prompt_too_long() {
        let e = Error::api("invalid_request_error", "Prompt is too long for this model");
        assert!(e.is_context_overflow());
    }

    #[test]
    fn test_not_overflow_other_errors() {
        assert!(!Error::Aborted.is_context_overflow());
        assert!(!Error::RateLimited { retry_after: None }.is_context_overflow());
    }
}
