// ABOUTME: Bot configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates connection settings and converts them into a session config
use anyhow::{Context, Result};
use mirai_core::{CacheOptions, ConnectionParams, PollOptions, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "MIRAI_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionParams,
    #[serde(default)]
    pub cache: CacheOptions,
    #[serde(default)]
    pub polling: PollOptions,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Event names logged as they arrive
    #[serde(default = "default_log_events")]
    pub log_events: Vec<String>,
    /// Reply to friend and group messages with their own message chain
    #[serde(default)]
    pub echo: bool,
}

fn default_log_events() -> Vec<String> {
    vec![
        "GroupMessage".to_string(),
        "FriendMessage".to_string(),
        "TempMessage".to_string(),
    ]
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            log_events: default_log_events(),
            echo: false,
        }
    }
}

impl Config {
    /// Find the config file: MIRAI_CONFIG_PATH if it exists, then ./config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %env_path, "{} points at a missing file", CONFIG_PATH_ENV);
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        None
    }

    /// Load configuration from the default locations with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_config_file().as_deref())
    }

    /// Load configuration from `path` (or defaults when `None`) with environment variable overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => {
                tracing::info!(path = %config_path.display(), "Loading configuration from file");
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read {}", config_path.display()))?;
                toml::from_str::<Config>(&content)
                    .with_context(|| format!("Failed to parse {}", config_path.display()))?
            }
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        let connection = &mut self.connection;
        if let Ok(val) = std::env::var("MIRAI_URL") {
            connection.url = Some(val);
        }
        if let Ok(val) = std::env::var("MIRAI_HOST") {
            connection.host = Some(val);
        }
        if let Ok(val) = std::env::var("MIRAI_PORT") {
            connection.port = Some(val.parse().with_context(|| {
                format!("MIRAI_PORT must be a valid port number, got: {}", val)
            })?);
        }
        if let Ok(val) = std::env::var("MIRAI_AUTH_KEY") {
            connection.auth_key = Some(val);
        }
        if let Ok(val) = std::env::var("MIRAI_QQ") {
            connection.qq = Some(val.parse().with_context(|| {
                format!("MIRAI_QQ must be a numeric account id, got: {}", val)
            })?);
        }
        Ok(())
    }

    /// Build the validated session settings these values describe
    pub fn session_config(&self) -> Result<SessionConfig> {
        let config = SessionConfig::from_params(&self.connection)
            .context("connection settings are incomplete (set in config.toml or MIRAI_* env vars)")?
            .with_cache(self.cache)
            .with_polling(self.polling.clone())
            .context("invalid [polling] settings")?;
        Ok(config)
    }
}
