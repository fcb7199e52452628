//! Configuration loading from TOML files

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for aquiline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
    /// Fixed page size sent with every request.
    pub page_limit: u32,
    /// Per-entity page ceiling before the fetch is declared stuck.
    pub max_pages: u32,
    /// Cooldown after an unexpected 429, seconds.
    pub cooldown_secs: u64,
    /// Retry rounds for failed entities.
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openaq.org/v3".to_string(),
            api_key: std::env::var("OPENAQ_API_KEY").ok(),
            page_limit: 1000,
            max_pages: aquiline_openaq::fetcher::DEFAULT_MAX_PAGES,
            cooldown_secs: 60,
            max_retries: aquiline_openaq::DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// Destination schema (namespace) inside the database.
    pub dataset: String,
    pub staging_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/aquiline.duckdb"),
            dataset: "openaq".to_string(),
            staging_dir: PathBuf::from("./data/staging"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub ledger_dir: PathBuf,
    pub compression_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            ledger_dir: PathBuf::from("./data/logs"),
            compression_level: 3,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./aquiline.toml (current directory)
    /// 2. ~/.config/aquiline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("aquiline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "aquiline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Client configuration derived from the API section.
    pub fn client_config(&self) -> aquiline_openaq::ClientConfig {
        aquiline_openaq::ClientConfig {
            base_url: self.api.base_url.clone(),
            api_key: self.api.api_key.clone(),
            page_limit: self.api.page_limit,
            cooldown: std::time::Duration::from_secs(self.api.cooldown_secs),
        }
    }
}
