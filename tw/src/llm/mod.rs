//! Generation model clients

use std::sync::Arc;

use tracing::{debug, warn};

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create a generation client from config
///
/// `Ok(None)` means fallback-only generation: the provider is `none` or the
/// API key is not set. An unknown provider is a configuration error.
pub fn create_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "none" | "" => {
            debug!("create_client: generation disabled");
            Ok(None)
        }
        "openai" => match OpenAIClient::from_config(config) {
            Ok(client) => Ok(Some(Arc::new(client))),
            Err(LlmError::MissingApiKey(var)) => {
                warn!(%var, "create_client: API key not set, using fallback planner only");
                Ok(None)
            }
            Err(e) => Err(e),
        },
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_none_provider() {
        let config = LlmConfig {
            provider: "none".to_string(),
            ..Default::default()
        };
        assert!(create_client(&config).unwrap().is_none());
    }

    #[test]
    fn test_create_client_missing_key_is_fallback_only() {
        let config = LlmConfig {
            api_key_env: "TRIPWEAVER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        assert!(create_client(&config).unwrap().is_none());
    }

    #[test]
    fn test_create_client_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_client(&config), Err(LlmError::UnknownProvider(_))));
    }
}
