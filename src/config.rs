use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::dataset::Metric;

/// Required prefix of NVIDIA API keys
pub const API_KEY_PREFIX: &str = "nvapi-";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable {0} not found")]
    MissingApiKey(String),
    #[error("API key is empty")]
    EmptyApiKey,
    #[error("API key must start with \"nvapi-\"")]
    MalformedApiKey,
}

/// Validated reward service credential
#[derive(Clone, PartialEq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        if !key.starts_with(API_KEY_PREFIX) || key.len() == API_KEY_PREFIX.len() {
            return Err(ConfigError::MalformedApiKey);
        }
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(\"nvapi-***\")")
    }
}

/// Settings for the remote reward model
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardConfig {
    /// OpenAI-compatible API endpoint
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Reward model identifier
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Upper bound on in-flight requests; all rows at once when unset
    pub max_concurrency: Option<usize>,
    /// Optional local path to store the batch report as JSON
    pub storage_path: Option<String>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://integrate.api.nvidia.com/v1".to_string(),
            env_var_api_key: "NVIDIA_API_KEY".to_string(),
            model: "nvidia/nemotron-4-340b-reward".to_string(),
            timeout_secs: 60,
            max_concurrency: None,
            storage_path: None,
        }
    }
}

impl RewardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read and validate the API key from the configured environment variable
    pub fn api_key(&self) -> Result<ApiKey, ConfigError> {
        let raw = std::env::var(&self.env_var_api_key)
            .map_err(|_| ConfigError::MissingApiKey(self.env_var_api_key.clone()))?;
        ApiKey::parse(&raw)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Only read the first `limit` rows
    pub limit: Option<usize>,
    /// Metrics requested from the external evaluation library
    pub metrics: Vec<Metric>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            limit: None,
            metrics: Metric::DEFAULT.to_vec(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub reward: RewardConfig,
    pub dataset: DatasetConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
[reward]
api_endpoint = "http://localhost:9000/v1"
env_var_api_key = "MY_REWARD_KEY"
model = "nvidia/nemotron-4-340b-reward"
timeout_secs = 5
max_concurrency = 4
storage_path = "/tmp/report.json"

[dataset]
limit = 10
metrics = ["answer_relevancy", "faithfulness"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.reward.api_endpoint, "http://localhost:9000/v1");
        assert_eq!(config.reward.env_var_api_key, "MY_REWARD_KEY");
        assert_eq!(config.reward.timeout(), Duration::from_secs(5));
        assert_eq!(config.reward.max_concurrency, Some(4));
        assert_eq!(config.reward.storage_path.as_deref(), Some("/tmp/report.json"));
        assert_eq!(config.dataset.limit, Some(10));
        assert_eq!(
            config.dataset.metrics,
            vec![Metric::AnswerRelevancy, Metric::Faithfulness]
        );
    }

    #[test]
    fn test_config_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[reward]\nmodel = \"custom-reward\"\n").unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.reward.model, "custom-reward");
        assert_eq!(config.reward.api_endpoint, "https://integrate.api.nvidia.com/v1");
        assert_eq!(config.reward.env_var_api_key, "NVIDIA_API_KEY");
        assert_eq!(config.reward.timeout_secs, 60);
        assert!(config.reward.max_concurrency.is_none());
        assert_eq!(config.dataset.metrics, Metric::DEFAULT.to_vec());
    }

    #[test]
    fn test_load_without_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.reward.model, "nvidia/nemotron-4-340b-reward");
    }

    #[test]
    fn test_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[reward\nmodel = 1").unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_api_key_parse() {
        let key = ApiKey::parse("  nvapi-abc123 \n").unwrap();
        assert_eq!(key.expose(), "nvapi-abc123");

        assert_eq!(ApiKey::parse(""), Err(ConfigError::EmptyApiKey));
        assert_eq!(ApiKey::parse("   "), Err(ConfigError::EmptyApiKey));
        assert_eq!(ApiKey::parse("sk-abc123"), Err(ConfigError::MalformedApiKey));
        assert_eq!(ApiKey::parse("nvapi-"), Err(ConfigError::MalformedApiKey));
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::parse("nvapi-secret").unwrap();
        assert!(!format!("{:?}", key).contains("secret"));
    }

    #[test]
    fn test_api_key_missing_env_var() {
        let config = RewardConfig {
            env_var_api_key: "RAG_REWARD_EVAL_TEST_UNSET_KEY".to_string(),
            ..RewardConfig::default()
        };

        let err = config.api_key().unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingApiKey("RAG_REWARD_EVAL_TEST_UNSET_KEY".to_string())
        );
        assert!(err.to_string().contains("not found"));
    }
}
