//! Model invocation layer
//!
//! Backends implement [`LlmClient`] (one round-trip per call); [`ModelInvoker`]
//! adds protocol probing, fallback, retry and per-call timeouts on top.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod invoker;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::{GenerationError, LlmError};
pub use invoker::{ModelInvoker, RetryPolicy};
pub use openai::OpenAIClient;
pub use types::{ModelRequest, ModelResponse, Protocol, ProtocolMode, ResponseShape};

use crate::config::ResolvedLlmConfig;

/// Create an LLM client for the configured provider
///
/// Supports "openai" and "anthropic" providers.
pub fn create_client(config: &ResolvedLlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, "create_client: called");
    match config.provider.as_str() {
        "openai" => {
            debug!("create_client: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: openai, anthropic",
                other
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(provider: &str) -> ResolvedLlmConfig {
        ResolvedLlmConfig {
            provider: provider.to_string(),
            api_key: "k".to_string(),
            base_url: "http://localhost".to_string(),
            max_tokens: 100,
            timeout_ms: 1000,
        }
    }

    #[test]
    fn test_create_client_by_provider() {
        assert_eq!(create_client(&resolved("openai")).unwrap().name(), "openai");
        assert_eq!(create_client(&resolved("anthropic")).unwrap().name(), "anthropic");
        assert!(create_client(&resolved("bard")).is_err());
    }
}
