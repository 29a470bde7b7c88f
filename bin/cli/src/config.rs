//! CLI configuration.
//!
//! Settings are layered with the `config` crate: an optional TOML file,
//! then `SWITCHYARD__*` environment variables (`__` separates sections, so
//! `SWITCHYARD__LLM__MODEL` sets `llm.model`).

use crate::error::CliError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use switchyard_ai::{LlmBackendConfig, LlmProvider};

/// Environment variable consulted when no Gemini API key is configured.
pub const GOOGLE_API_KEY_VAR: &str = "GOOGLE_API_KEY";

/// Complete CLI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Model backend settings.
    #[serde(default)]
    pub llm: LlmSettings,

    /// Request and pattern settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Which model to talk to and how.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,

    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Gemini API key. Falls back to `GOOGLE_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Sampling temperature for free-form calls.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// HTTP timeout for one model call, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

/// Per-request limits.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Deadline for a whole request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_reflection_max_iterations")]
    pub reflection_max_iterations: u32,

    #[serde(default = "default_agent_max_steps")]
    pub agent_max_steps: u32,
}

fn default_provider() -> LlmProvider {
    LlmProvider::Gemini
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_http_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_reflection_max_iterations() -> u32 {
    3
}

fn default_agent_max_steps() -> u32 {
    5
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            api_key: None,
            temperature: None,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            reflection_max_iterations: default_reflection_max_iterations(),
            agent_max_steps: default_agent_max_steps(),
        }
    }
}

impl PipelineSettings {
    /// Returns the per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    /// Loads configuration from an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the wrong
    /// type.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("SWITCHYARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl LlmSettings {
    /// Builds the backend configuration, taking the Gemini key from
    /// `fallback_api_key` when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] when Gemini is selected and no key is
    /// available.
    pub fn backend_config(
        &self,
        fallback_api_key: Option<String>,
    ) -> Result<LlmBackendConfig, CliError> {
        let config = match self.provider {
            LlmProvider::Gemini => {
                let api_key = self
                    .api_key
                    .clone()
                    .or(fallback_api_key)
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| CliError::Config {
                        reason: format!(
                            "gemini needs llm.api_key or {GOOGLE_API_KEY_VAR}"
                        ),
                    })?;
                LlmBackendConfig::gemini(api_key, self.model.as_str())
            }
            LlmProvider::Ollama => {
                LlmBackendConfig::ollama(LlmBackendConfig::OLLAMA_BASE_URL, self.model.as_str())
            }
        };
        let config = match &self.base_url {
            Some(url) => config.with_base_url(url.as_str()),
            None => config,
        };
        Ok(config.with_timeout(Duration::from_secs(self.timeout_secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_sources() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.pipeline.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.pipeline.agent_max_steps, 5);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "[llm]\nprovider = \"ollama\"\nmodel = \"llama3\"\n\n[pipeline]\nreflection_max_iterations = 5"
        )
        .expect("write config");

        let config = AppConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.pipeline.reflection_max_iterations, 5);
        assert_eq!(config.pipeline.request_timeout_secs, 120);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml");
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn gemini_requires_a_key() {
        let settings = LlmSettings::default();
        let err = settings.backend_config(None).expect_err("no key");
        assert!(matches!(err, CliError::Config { .. }));

        let config = settings
            .backend_config(Some("from-env".to_string()))
            .expect("fallback key");
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn configured_key_wins_over_fallback() {
        let settings = LlmSettings {
            api_key: Some("configured".to_string()),
            ..LlmSettings::default()
        };
        let config = settings
            .backend_config(Some("from-env".to_string()))
            .expect("key");
        assert_eq!(config.api_key.as_deref(), Some("configured"));
    }

    #[test]
    fn ollama_honours_base_url_and_timeout() {
        let settings = LlmSettings {
            provider: LlmProvider::Ollama,
            base_url: Some("http://gpu-box:11434".to_string()),
            timeout_secs: 10,
            ..LlmSettings::default()
        };
        let config = settings.backend_config(None).expect("ollama config");
        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }
}
