//! LlmClient trait definition

use async_trait::async_trait;

use super::{LlmError, ModelRequest, Protocol};

/// One backend that can answer a request over one or both protocols
///
/// Each `send` is a single round-trip with no retries. Fallback, retry and
/// backoff belong to `ModelInvoker`, which owns the client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Send the request over the given protocol and return the generated text
    ///
    /// Backends that do not offer a protocol return `LlmError::Unsupported`.
    async fn send(&self, protocol: Protocol, request: &ModelRequest) -> Result<String, LlmError>;
}
