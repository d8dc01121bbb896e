use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::ColonyError;

const DEFAULT_CONFIG_PATH: &str = "colony.toml";
const CONFIG_PATH_ENV: &str = "COLONY_CONFIG";
const SUPPORTED_PROVIDER: &str = "anthropic";

/// Top-level configuration structure. Every section is optional in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ColonyConfig {
    pub llm: LlmConfig,
    pub sources: SourcesConfig,
    pub run: RunConfig,
    pub verifier: VerifierConfig,
    pub knowledge: KnowledgeConfig,
    pub logging: LoggingConfig,
}

impl ColonyConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ColonyError> {
        let config: ColonyConfig = toml::from_str(raw)
            .map_err(|err| ColonyError::InvalidConfiguration(err.to_string()))?;
        ConfigLoader::validate(&config)?;
        Ok(config)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `COLONY_CONFIG` environment variable.
    /// 3. `colony.toml` in the current working directory.
    ///
    /// Only the implicit default may be absent, in which case defaults apply.
    pub fn load(path: Option<PathBuf>) -> Result<ColonyConfig, ColonyError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            return Ok(ColonyConfig::default());
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| ColonyError::config_io(candidate.clone(), err))?;
        ColonyConfig::from_toml_str(&raw)
    }

    fn validate(config: &ColonyConfig) -> Result<(), ColonyError> {
        if !config.llm.provider.eq_ignore_ascii_case(SUPPORTED_PROVIDER) {
            return Err(ColonyError::InvalidConfiguration(format!(
                "llm.provider `{}` is not supported; only `{SUPPORTED_PROVIDER}` is available",
                config.llm.provider
            )));
        }
        if config.llm.api_key_env.trim().is_empty() {
            return Err(ColonyError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.run.max_iterations == 0 {
            return Err(ColonyError::InvalidConfiguration(
                "run.max_iterations must be at least 1".into(),
            ));
        }
        if config.run.max_threads == 0 {
            return Err(ColonyError::InvalidConfiguration(
                "run.max_threads must be at least 1".into(),
            ));
        }
        if config.llm.timeout_ms == 0
            || config.sources.timeout_ms == 0
            || config.verifier.timeout_ms == 0
        {
            return Err(ColonyError::InvalidConfiguration(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: SUPPORTED_PROVIDER.to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 1500,
            timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub web_api_key_env: String,
    pub scholar_api_key_env: String,
    pub max_results: usize,
    pub timeout_ms: u64,
    pub rate_limit_retry_delay_ms: u64,
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_retry_delay_ms)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            web_api_key_env: "BRAVE_API_KEY".to_string(),
            scholar_api_key_env: "SEMANTIC_SCHOLAR_API_KEY".to_string(),
            max_results: 5,
            timeout_ms: 10_000,
            rate_limit_retry_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Iterations allowed across every thread of one run.
    pub max_iterations: usize,
    /// Re-investigations allowed per thread beyond the first pass.
    pub max_depth: u32,
    /// Start offset between consecutive thread pipelines.
    pub stagger_ms: u64,
    pub max_threads: usize,
}

impl RunConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_depth: 2,
            stagger_ms: 1_500,
            max_threads: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub timeout_ms: u64,
    pub max_content_chars: usize,
}

impl VerifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            max_content_chars: 8_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub path: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/knowledge-graph.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ColonyConfig::from_toml_str("").unwrap();
        assert_eq!(config.run.max_iterations, 10);
        assert_eq!(config.run.max_depth, 2);
        assert_eq!(config.verifier.timeout_ms, 8_000);
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let raw = r#"
            [run]
            max_iterations = 4
            stagger_ms = 0

            [knowledge]
            path = "/tmp/colony.jsonl"
        "#;
        let config = ColonyConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.run.max_iterations, 4);
        assert_eq!(config.run.max_depth, 2);
        assert_eq!(config.run.stagger(), Duration::ZERO);
        assert_eq!(config.knowledge.path, PathBuf::from("/tmp/colony.jsonl"));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let err = ColonyConfig::from_toml_str("[run]\nmax_iterations = 0\n").unwrap_err();
        assert!(matches!(err, ColonyError::InvalidConfiguration(_)));
    }

    #[test]
    fn unsupported_provider_is_rejected() {
        let err = ColonyConfig::from_toml_str("[llm]\nprovider = \"openai\"\n").unwrap_err();
        assert!(
            matches!(err, ColonyError::InvalidConfiguration(ref msg) if msg.contains("openai"))
        );
        assert!(ColonyConfig::from_toml_str("[llm]\nprovider = \"Anthropic\"\n").is_ok());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = ConfigLoader::load(Some(dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ColonyError::ConfigIo { .. }));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("colony.toml");
        std::fs::write(&path, "[verifier]\ntimeout_ms = 500\n").unwrap();
        let config = ConfigLoader::load(Some(path)).unwrap();
        assert_eq!(config.verifier.timeout(), Duration::from_millis(500));
    }
}
