//! ModelInvoker - protocol fallback and retry around an LlmClient
//!
//! Callers see one operation, `generate`. Which protocol carried the request,
//! how many attempts it took and whether a fallback happened are reported in
//! the `ModelResponse` but never change the contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{GenerationError, LlmClient, LlmError, ModelRequest, ModelResponse, Protocol, ProtocolMode};
use crate::config::LlmConfig;

const UNDECIDED: u8 = 0;
const STRUCTURED: u8 = 1;
const CONVERSATIONAL: u8 = 2;

/// Retry and timeout settings for one invoker
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt for transient errors
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time
    pub initial_backoff: Duration,
    /// Cap for any single delay
    pub max_backoff: Duration,
    /// Bound on one attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
            attempt_timeout: Duration::from_millis(300_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            attempt_timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// A rate limit's retry-after wins when it is longer than the exponential
    /// delay. Both are capped by `max_backoff`.
    pub fn backoff(&self, retry: u32, error: &LlmError) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let exponential = self.initial_backoff.saturating_mul(2u32.pow(exponent));
        let delay = match error.retry_after() {
            Some(wait) if wait > exponential => wait,
            _ => exponential,
        };
        delay.min(self.max_backoff)
    }
}

/// Turns a request into generated text, hiding protocol choice and transient failures
pub struct ModelInvoker {
    client: Arc<dyn LlmClient>,
    mode: ProtocolMode,
    policy: RetryPolicy,
    /// Protocol pinned by the first decisive probe (one of the consts above)
    preferred: AtomicU8,
}

impl ModelInvoker {
    pub fn new(client: Arc<dyn LlmClient>, mode: ProtocolMode, policy: RetryPolicy) -> Self {
        debug!(client = client.name(), ?mode, ?policy, "ModelInvoker::new: called");
        let preferred = match mode {
            ProtocolMode::Auto => UNDECIDED,
            ProtocolMode::Structured => STRUCTURED,
            ProtocolMode::Conversational => CONVERSATIONAL,
        };
        Self {
            client,
            mode,
            policy,
            preferred: AtomicU8::new(preferred),
        }
    }

    /// Protocol settled on so far, `None` until the first probe resolves
    pub fn preferred_protocol(&self) -> Option<Protocol> {
        match self.preferred.load(Ordering::SeqCst) {
            STRUCTURED => Some(Protocol::Structured),
            CONVERSATIONAL => Some(Protocol::Conversational),
            _ => None,
        }
    }

    fn pin(&self, protocol: Protocol) {
        let value = match protocol {
            Protocol::Structured => STRUCTURED,
            Protocol::Conversational => CONVERSATIONAL,
        };
        let previous = self.preferred.swap(value, Ordering::SeqCst);
        if previous != value {
            info!(%protocol, client = self.client.name(), "Pinned model protocol");
        }
    }

    /// Generate text for one logical request
    ///
    /// In `auto` mode an unsupported structured call is retried once over the
    /// conversational protocol and that choice sticks for later calls.
    pub async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, GenerationError> {
        let protocol = self.preferred_protocol().unwrap_or(Protocol::Structured);
        debug!(%protocol, model = %request.model, "generate: called");
        let mut attempts = 0;

        match self.send_with_retry(protocol, request, &mut attempts).await {
            Ok(text) => {
                if self.mode == ProtocolMode::Auto && self.preferred_protocol().is_none() {
                    self.pin(protocol);
                }
                Ok(ModelResponse {
                    text,
                    protocol,
                    attempts,
                })
            }
            Err(e) if e.is_unsupported() && protocol == Protocol::Structured && self.mode == ProtocolMode::Auto => {
                warn!(error = %e, "Structured protocol unavailable, falling back to conversational");
                self.pin(Protocol::Conversational);

                let fallback = Protocol::Conversational;
                let text = self
                    .send_with_retry(fallback, request, &mut attempts)
                    .await
                    .map_err(|source| GenerationError {
                        protocol: fallback,
                        attempts,
                        source,
                    })?;
                Ok(ModelResponse {
                    text,
                    protocol: fallback,
                    attempts,
                })
            }
            Err(source) => Err(GenerationError {
                protocol,
                attempts,
                source,
            }),
        }
    }

    /// One protocol, bounded retries with exponential backoff
    async fn send_with_retry(
        &self,
        protocol: Protocol,
        request: &ModelRequest,
        attempts: &mut u32,
    ) -> Result<String, LlmError> {
        let mut retry = 0;
        loop {
            *attempts += 1;
            let result = match tokio::time::timeout(self.policy.attempt_timeout, self.client.send(protocol, request)).await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.policy.attempt_timeout)),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.backoff(retry, &e);
                    warn!(
                        %protocol,
                        retry,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(%protocol, error = %e, "send_with_retry: giving up");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use async_trait::async_trait;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn request() -> ModelRequest {
        ModelRequest::new("test-model", "instructions", "prompt")
    }

    #[tokio::test]
    async fn test_structured_success_pins_structured() {
        let client = Arc::new(MockLlmClient::new(vec![
            MockReply::Text("first".into()),
            MockReply::Text("second".into()),
        ]));
        let invoker = ModelInvoker::new(client.clone(), ProtocolMode::Auto, fast_policy());
        assert_eq!(invoker.preferred_protocol(), None);

        let resp = invoker.generate(&request()).await.unwrap();
        assert_eq!(resp.text, "first");
        assert_eq!(resp.protocol, Protocol::Structured);
        assert_eq!(resp.attempts, 1);
        assert_eq!(invoker.preferred_protocol(), Some(Protocol::Structured));

        invoker.generate(&request()).await.unwrap();
        assert_eq!(client.calls(), vec![Protocol::Structured, Protocol::Structured]);
    }

    #[tokio::test]
    async fn test_fallback_to_conversational_and_no_reprobe() {
        let client = Arc::new(
            MockLlmClient::new(vec![MockReply::Text("a".into()), MockReply::Text("b".into())]).without_structured(),
        );
        let invoker = ModelInvoker::new(client.clone(), ProtocolMode::Auto, fast_policy());

        let first = invoker.generate(&request()).await.unwrap();
        assert_eq!(first.text, "a");
        assert_eq!(first.protocol, Protocol::Conversational);
        assert_eq!(first.attempts, 2);

        let second = invoker.generate(&request()).await.unwrap();
        assert_eq!(second.text, "b");
        assert_eq!(second.attempts, 1);

        // Structured was probed exactly once
        assert_eq!(
            client.calls(),
            vec![
                Protocol::Structured,
                Protocol::Conversational,
                Protocol::Conversational
            ]
        );
    }

    #[tokio::test]
    async fn test_forced_structured_does_not_fall_back() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::Text("x".into())]).without_structured());
        let invoker = ModelInvoker::new(client.clone(), ProtocolMode::Structured, fast_policy());

        let err = invoker.generate(&request()).await.unwrap_err();
        assert!(err.source.is_unsupported());
        assert_eq!(err.protocol, Protocol::Structured);
        assert_eq!(client.calls(), vec![Protocol::Structured]);
    }

    #[tokio::test]
    async fn test_forced_conversational_skips_probe() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::Text("x".into())]));
        let invoker = ModelInvoker::new(client.clone(), ProtocolMode::Conversational, fast_policy());

        let resp = invoker.generate(&request()).await.unwrap();
        assert_eq!(resp.protocol, Protocol::Conversational);
        assert_eq!(client.calls(), vec![Protocol::Conversational]);
    }

    #[tokio::test]
    async fn test_transient_errors_then_success() {
        let client = Arc::new(MockLlmClient::new(vec![
            MockReply::Status(503),
            MockReply::Timeout,
            MockReply::Text("ok".into()),
        ]));
        let invoker = ModelInvoker::new(client, ProtocolMode::Auto, fast_policy());

        let resp = invoker.generate(&request()).await.unwrap();
        assert_eq!(resp.text, "ok");
        assert_eq!(resp.attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::Status(500); 4]));
        let invoker = ModelInvoker::new(client.clone(), ProtocolMode::Auto, fast_policy());

        let err = invoker.generate(&request()).await.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert!(matches!(err.source, LlmError::ApiError { status: 500, .. }));
        // Nothing decisive happened, so the probe is still open
        assert_eq!(invoker.preferred_protocol(), None);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::Status(401), MockReply::Text("never".into())]));
        let invoker = ModelInvoker::new(client.clone(), ProtocolMode::Auto, fast_policy());

        let err = invoker.generate(&request()).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_output_is_not_retried() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::Empty]));
        let invoker = ModelInvoker::new(client, ProtocolMode::Conversational, fast_policy());

        let err = invoker.generate(&request()).await.unwrap_err();
        assert!(matches!(err.source, LlmError::InvalidResponse(_)));
        assert_eq!(err.attempts, 1);
    }

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send(&self, _protocol: Protocol, _request: &ModelRequest) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_transient() {
        let policy = RetryPolicy {
            max_retries: 1,
            attempt_timeout: Duration::from_millis(10),
            ..fast_policy()
        };
        let invoker = ModelInvoker::new(Arc::new(SlowClient), ProtocolMode::Conversational, policy);

        let err = invoker.generate(&request()).await.unwrap_err();
        assert!(matches!(err.source, LlmError::Timeout(_)));
        assert_eq!(err.attempts, 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            attempt_timeout: Duration::from_secs(1),
        };
        let err = LlmError::Timeout(Duration::from_secs(1));
        assert_eq!(policy.backoff(1, &err), Duration::from_millis(100));
        assert_eq!(policy.backoff(2, &err), Duration::from_millis(200));
        assert_eq!(policy.backoff(3, &err), Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_honors_retry_after() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(1),
        };
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(2),
        };
        assert_eq!(policy.backoff(1, &err), Duration::from_secs(2));

        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(60),
        };
        assert_eq!(policy.backoff(1, &err), Duration::from_secs(10));
    }
}
