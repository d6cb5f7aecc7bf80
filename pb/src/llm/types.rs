//! LLM request/response types for planbuilder
//!
//! These are provider-agnostic. Each backend maps a `ModelRequest` onto its own
//! wire format for whichever protocol the invoker picks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Wire protocol used for one model call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Richer request shape with a dedicated instructions slot and output-format hints
    Structured,
    /// Plain system + user chat messages, supported by every backend
    Conversational,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Structured => "structured",
            Protocol::Conversational => "conversational",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the invoker chooses a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Probe the structured protocol once, fall back to conversational if unsupported
    #[default]
    Auto,
    Structured,
    Conversational,
}

impl FromStr for ProtocolMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "ProtocolMode::from_str: called");
        match s.to_lowercase().as_str() {
            "auto" => Ok(ProtocolMode::Auto),
            "structured" => Ok(ProtocolMode::Structured),
            "conversational" => Ok(ProtocolMode::Conversational),
            other => Err(format!(
                "Unknown protocol '{}'. Supported: auto, structured, conversational",
                other
            )),
        }
    }
}

/// Output-shape hint sent along with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// No particular shape
    Text,
    /// Markdown document using the listed headings
    Markdown { headings: Vec<String> },
}

impl ResponseShape {
    /// Markdown shape from a list of heading names
    pub fn markdown<I, S>(headings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResponseShape::Markdown {
            headings: headings.into_iter().map(Into::into).collect(),
        }
    }

    /// Human-readable form of the hint, for protocols with no dedicated slot
    pub fn describe(&self) -> Option<String> {
        match self {
            ResponseShape::Text => None,
            ResponseShape::Markdown { headings } if headings.is_empty() => {
                Some("Respond in GitHub-flavored Markdown.".to_string())
            }
            ResponseShape::Markdown { headings } => Some(format!(
                "Respond in GitHub-flavored Markdown using these headings, in order: {}.",
                headings.join(", ")
            )),
        }
    }
}

/// One logical generation request
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Model identifier
    pub model: String,

    /// System-level instructions
    pub instructions: String,

    /// The user input (design text, section context)
    pub prompt: String,

    /// Output-shape hint
    pub shape: ResponseShape,

    /// Max tokens for the response
    pub max_tokens: u32,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, instructions: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            prompt: prompt.into(),
            shape: ResponseShape::Text,
            max_tokens: 16384,
        }
    }

    pub fn with_shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of a successful generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    /// Generated text
    pub text: String,

    /// Protocol that produced the text
    pub protocol: Protocol,

    /// Total attempts spent, including fallback and retries
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_mode_from_str() {
        assert_eq!("auto".parse::<ProtocolMode>(), Ok(ProtocolMode::Auto));
        assert_eq!("Structured".parse::<ProtocolMode>(), Ok(ProtocolMode::Structured));
        assert_eq!(
            "conversational".parse::<ProtocolMode>(),
            Ok(ProtocolMode::Conversational)
        );
        assert!("grpc".parse::<ProtocolMode>().is_err());
    }

    #[test]
    fn test_shape_describe() {
        assert_eq!(ResponseShape::Text.describe(), None);

        let shape = ResponseShape::markdown(["Summary", "Risks"]);
        let hint = shape.describe().unwrap();
        assert!(hint.contains("Summary, Risks"));
    }

    #[test]
    fn test_request_builder() {
        let req = ModelRequest::new("gpt-5-mini", "be brief", "hello")
            .with_shape(ResponseShape::markdown(Vec::<String>::new()))
            .with_max_tokens(100);
        assert_eq!(req.model, "gpt-5-mini");
        assert_eq!(req.max_tokens, 100);
        assert_eq!(req.shape, ResponseShape::Markdown { headings: vec![] });
    }
}
