//! Failures of the plan-writing model call. Every variant ends in the
//! fallback planner; none is surfaced to the user.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// 429 from the provider. Not retried within one request.
    #[error("provider rate limited the request, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("provider returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("could not reach provider: {0}")]
    Network(#[source] reqwest::Error),

    #[error("unusable completion: {0}")]
    InvalidResponse(String),

    #[error("no API key in ${0}")]
    MissingApiKey(String),

    #[error("unknown llm provider '{0}' (expected openai or none)")]
    UnknownProvider(String),

    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_fix() {
        assert_eq!(
            LlmError::MissingApiKey("OPENAI_API_KEY".to_string()).to_string(),
            "no API key in $OPENAI_API_KEY"
        );
        assert!(LlmError::UnknownProvider("claude".to_string()).to_string().contains("openai or none"));
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(42)
            }
            .to_string()
            .contains("42s")
        );
    }
}
