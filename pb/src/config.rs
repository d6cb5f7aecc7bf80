//! planbuilder configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::ProtocolMode;

/// Main planbuilder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Plan generation settings
    pub plan: PlanConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .planbuilder.yml
        let local_config = PathBuf::from(".planbuilder.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/planbuilder/planbuilder.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("planbuilder").join("planbuilder.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" or "anthropic")
    pub provider: String,

    /// Environment variable containing the API key (provider default when unset)
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// API base URL (provider default when unset)
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Protocol selection
    pub protocol: ProtocolMode,

    /// Retries for transient failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on every retry
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key_env: None,
            base_url: None,
            max_tokens: 16384,
            timeout_ms: 300_000,
            protocol: ProtocolMode::Auto,
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl LlmConfig {
    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> &str {
        match &self.api_key_env {
            Some(env) => env,
            None if self.provider == "anthropic" => "ANTHROPIC_API_KEY",
            None => "OPENAI_API_KEY",
        }
    }

    /// API base URL
    pub fn base_url(&self) -> &str {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/'),
            None if self.provider == "anthropic" => "https://api.anthropic.com",
            None => "https://api.openai.com",
        }
    }

    /// Read the credential once and produce the settings a client is built from
    ///
    /// Fails fast when the API key variable is unset so no model call is attempted.
    pub fn resolve(&self) -> Result<ResolvedLlmConfig> {
        let env = self.api_key_env();
        let api_key = std::env::var(env)
            .map_err(|_| eyre::eyre!("LLM API key not found. Set the {} environment variable.", env))?;

        Ok(ResolvedLlmConfig {
            provider: self.provider.clone(),
            api_key,
            base_url: self.base_url().to_string(),
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// LLM settings with the credential already read from the environment
#[derive(Clone)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl fmt::Debug for ResolvedLlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedLlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Plan generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Where overview_plan.md and sections/ are written
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Model used for the overview phase
    #[serde(rename = "overview-model")]
    pub overview_model: String,

    /// Model used for each section detail plan
    #[serde(rename = "detail-model")]
    pub detail_model: String,

    /// Maximum concurrent section generations
    pub concurrency: usize,

    /// Design text budget included in each section prompt
    #[serde(rename = "max-context-chars")]
    pub max_context_chars: usize,

    /// Fewer parsed sections than this fails the run
    #[serde(rename = "min-sections")]
    pub min_sections: usize,

    /// Directory of `.pmt` prompt overrides
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("docs/generated-plan"),
            overview_model: "gpt-5.2".to_string(),
            detail_model: "gpt-5-mini".to_string(),
            concurrency: 4,
            max_context_chars: 24_000,
            min_sections: 1,
            prompts_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.plan.output_dir, PathBuf::from("docs/generated-plan"));
        assert_eq!(config.plan.overview_model, "gpt-5.2");
        assert_eq!(config.plan.detail_model, "gpt-5-mini");
        assert_eq!(config.plan.min_sections, 1);
        assert_eq!(config.llm.protocol, ProtocolMode::Auto);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.api_key_env(), "OPENAI_API_KEY");
        assert_eq!(config.llm.base_url(), "https://api.openai.com");
    }

    #[test]
    fn test_provider_defaults_for_anthropic() {
        let llm = LlmConfig {
            provider: "anthropic".to_string(),
            ..Default::default()
        };
        assert_eq!(llm.api_key_env(), "ANTHROPIC_API_KEY");
        assert_eq!(llm.base_url(), "https://api.anthropic.com");
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("planbuilder.yml");
        fs::write(
            &path,
            "log-level: debug\nllm:\n  protocol: conversational\n  base-url: http://localhost:8080/\nplan:\n  output-dir: out\n  concurrency: 2\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.llm.protocol, ProtocolMode::Conversational);
        assert_eq!(config.llm.base_url(), "http://localhost:8080");
        assert_eq!(config.plan.output_dir, PathBuf::from("out"));
        assert_eq!(config.plan.concurrency, 2);
        // Untouched fields keep their defaults
        assert_eq!(config.plan.detail_model, "gpt-5-mini");
        assert_eq!(config.llm.max_tokens, 16384);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_reads_api_key() {
        let llm = LlmConfig {
            api_key_env: Some("PB_TEST_API_KEY".to_string()),
            ..Default::default()
        };

        unsafe { std::env::set_var("PB_TEST_API_KEY", "sk-test") };
        let resolved = llm.resolve().unwrap();
        assert_eq!(resolved.api_key, "sk-test");
        assert!(!format!("{:?}", resolved).contains("sk-test"));

        unsafe { std::env::remove_var("PB_TEST_API_KEY") };
        let err = llm.resolve().unwrap_err();
        assert!(err.to_string().contains("PB_TEST_API_KEY"));
    }
}
