//! Configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen port advertised to the transport layer
    pub port: u16,

    /// LLM backend configuration
    pub llm: LlmConfig,

    /// Profile provider configuration
    pub profile: ProfileConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            llm: LlmConfig::default(),
            profile: ProfileConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: explicit file, then `./chatrelay.yml`, then
    /// defaults; environment overrides are applied on top in every case.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?
        } else {
            let local = PathBuf::from("chatrelay.yml");
            if local.exists() {
                match Self::load_from_file(&local) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", local.display(), e);
                        Self::default()
                    }
                }
            } else {
                Self::default()
            }
        };

        config.apply_env();
        Ok(config)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Environment overrides: `PORT`, `LLM_MAX_RETRIES`, `LLM_RETRY_BASE_MS`
    fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse()
        {
            self.port = port;
        }
        if let Ok(retries) = std::env::var("LLM_MAX_RETRIES")
            && let Ok(retries) = retries.parse()
        {
            self.llm.max_retries = retries;
        }
        if let Ok(base) = std::env::var("LLM_RETRY_BASE_MS")
            && let Ok(base) = base.parse()
        {
            self.llm.retry_base_ms = base;
        }
    }
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Retry attempts for transient backend failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    #[serde(rename = "retry-base-ms")]
    pub retry_base_ms: u64,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            max_retries: 3,
            retry_base_ms: 800,
            timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre!("API key environment variable {} not set", self.api_key_env))
    }
}

/// Profile provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Environment variable containing the provider credential; absent
    /// credential disables profile context entirely
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            api_key_env: "PROFILE_API_KEY".to_string(),
            base_url: String::new(),
        }
    }
}

impl ProfileConfig {
    pub fn enabled(&self) -> bool {
        std::env::var(&self.api_key_env).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.retry_base_ms, 800);
        assert_eq!(config.llm.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port: 8080\nllm:\n  model: gemini-test\n  max-retries: 5"
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.llm.model, "gemini-test");
        assert_eq!(config.llm.max_retries, 5);
        // Unspecified fields keep defaults
        assert_eq!(config.llm.retry_base_ms, 800);
    }

    #[test]
    fn test_missing_api_key() {
        let llm = LlmConfig {
            api_key_env: "CHATRELAY_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            ..Default::default()
        };
        assert!(llm.get_api_key().is_err());
    }
}
