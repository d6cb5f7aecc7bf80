//! Anthropic Claude API client implementation
//!
//! The Messages API only speaks the conversational protocol. Structured calls
//! are answered with `LlmError::Unsupported` without touching the network, so
//! the invoker's probe settles on conversational after the first request.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::error::error_from_status;
use super::openai::retry_after;
use super::{LlmClient, LlmError, ModelRequest, Protocol};
use crate::config::ResolvedLlmConfig;

/// Anthropic Claude API client
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicClient {
    /// Create a new client from resolved configuration
    pub fn from_config(config: &ResolvedLlmConfig) -> Result<Self, LlmError> {
        debug!(?config, "from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);

        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    /// Build the request body for the Anthropic API
    fn build_request_body(&self, request: &ModelRequest) -> serde_json::Value {
        debug!(%request.model, %request.max_tokens, "build_request_body: called");
        let mut system = request.instructions.clone();
        if let Some(hint) = request.shape.describe() {
            system.push_str("\n\n");
            system.push_str(&hint);
        }

        serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": system,
            "messages": [
                { "role": "user", "content": request.prompt },
            ],
        })
    }

    /// Concatenate the text blocks of a response
    fn parse_response(&self, api_response: AnthropicResponse) -> Result<String, LlmError> {
        debug!(?api_response.stop_reason, "parse_response: called");
        let text: String = api_response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse("Model returned empty output".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn send(&self, protocol: Protocol, request: &ModelRequest) -> Result<String, LlmError> {
        debug!(%protocol, %request.model, "send: called");
        if protocol == Protocol::Structured {
            debug!("send: structured protocol not offered");
            return Err(LlmError::Unsupported {
                protocol,
                message: "Messages API has no structured endpoint".to_string(),
            });
        }

        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(request);

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    debug!(error = %e, "send: network error");
                    LlmError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let wait = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "send: API error");
            // 529 is Anthropic's "overloaded"
            return Err(error_from_status(protocol, status.as_u16(), wait, text));
        }

        debug!("send: success");
        let api_response: AnthropicResponse = response.json().await?;
        self.parse_response(api_response)
    }
}

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}
