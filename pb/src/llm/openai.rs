//! OpenAI API client implementation
//!
//! Implements the LlmClient trait over both OpenAI protocols:
//! the Responses API (structured) and Chat Completions (conversational).

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::error::error_from_status;
use super::{LlmClient, LlmError, ModelRequest, Protocol};
use crate::config::ResolvedLlmConfig;

/// OpenAI API client
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAIClient {
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

    /// Build the request body for the Responses API
    ///
    /// The shape hint is a developer input item ahead of the user input and is
    /// kept out of `instructions`. Output format is plain text: responses are
    /// Markdown, not JSON.
    fn build_responses_body(&self, request: &ModelRequest) -> serde_json::Value {
        debug!(%request.model, %request.max_tokens, "build_responses_body: called");

        let input = match request.shape.describe() {
            Some(hint) => serde_json::json!([
                { "role": "developer", "content": hint },
                { "role": "user", "content": request.prompt },
            ]),
            None => serde_json::json!(request.prompt),
        };

        serde_json::json!({
            "model": request.model,
            "instructions": request.instructions,
            "input": input,
            "max_output_tokens": request.max_tokens.min(self.max_tokens),
            "text": {
                "format": { "type": "text" },
            },
        })
    }

    /// Build the request body for the Chat Completions API
    fn build_chat_body(&self, request: &ModelRequest) -> serde_json::Value {
        debug!(%request.model, %request.max_tokens, "build_chat_body: called");

        let mut system = request.instructions.clone();
        if let Some(hint) = request.shape.describe() {
            system.push_str("\n\n");
            system.push_str(&hint);
        }

        let max_tokens = request.max_tokens.min(self.max_tokens);

        // GPT-5.x and o1/o3 models use max_completion_tokens instead of max_tokens
        let model = request.model.as_str();
        let uses_completion_tokens = model.starts_with("gpt-5") || model.starts_with("o1") || model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request.prompt },
            ],
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    fn endpoint(&self, protocol: Protocol) -> String {
        match protocol {
            Protocol::Structured => format!("{}/v1/responses", self.base_url),
            Protocol::Conversational => format!("{}/v1/chat/completions", self.base_url),
        }
    }
}

/// Extract the generated text from a Responses API body
fn parse_responses_output(api_response: ResponsesApiResponse) -> Result<String, LlmError> {
    debug!(item_count = api_response.output.len(), "parse_responses_output: called");
    if let Some(text) = api_response.output_text
        && !text.trim().is_empty()
    {
        return Ok(text);
    }

    let text: String = api_response
        .output
        .into_iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| item.content)
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text)
        .collect();

    non_empty(text)
}

/// Extract the generated text from a Chat Completions body
fn parse_chat_output(api_response: ChatResponse) -> Result<String, LlmError> {
    debug!(choice_count = api_response.choices.len(), "parse_chat_output: called");
    let text = api_response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    non_empty(text)
}

fn non_empty(text: String) -> Result<String, LlmError> {
    if text.trim().is_empty() {
        Err(LlmError::InvalidResponse("Model returned empty output".to_string()))
    } else {
        Ok(text)
    }
}

pub(super) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl LlmClient for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, protocol: Protocol, request: &ModelRequest) -> Result<String, LlmError> {
        debug!(%protocol, %request.model, "send: called");
        let url = self.endpoint(protocol);
        let body = match protocol {
            Protocol::Structured => self.build_responses_body(request),
            Protocol::Conversational => self.build_chat_body(request),
        };

        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    debug!("send: request timed out");
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
            return Err(error_from_status(protocol, status.as_u16(), wait, text));
        }

        debug!("send: success");
        match protocol {
            Protocol::Structured => parse_responses_output(response.json().await?),
            Protocol::Conversational => parse_chat_output(response.json().await?),
        }
    }
}

// Responses API types

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    #[serde(default)]
    output_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ResponsesContentPart>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

// Chat Completions types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
