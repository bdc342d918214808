use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{LogLevel, TimeRange};
use crate::monitor::NoveltyPolicy;

/// Configuration for the HoneyGuard tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HoneyGuard API configuration
    pub api: ApiConfig,
    /// Access-log and location polling configuration
    pub polling: PollingConfig,
    /// Alert fan-out configuration
    #[serde(default)]
    pub alerting: AlertConfig,
    /// Output configuration
    pub output: OutputConfig,
}

/// HoneyGuard API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL the endpoints hang off, e.g. "https://honeyguard.example/api"
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between access-log polls
    pub interval_secs: u64,
    /// How newly fetched entries are told apart from the baseline
    #[serde(default)]
    pub novelty_policy: NoveltyPolicy,
    /// Maximum number of new entries listed in one alert summary
    pub summary_limit: usize,
    /// Time range filter sent with every log query
    pub time_range: Option<TimeRange>,
    /// Level filter sent with every log query (all levels when unset)
    pub level: Option<LogLevel>,
    /// Seconds between location polls; 0 disables location polling
    pub location_interval_secs: u64,
    /// Tokens to watch individually; empty watches all tokens at once
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Alert fan-out configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Forward notifications to the configured channels
    pub enabled: bool,
    /// Also forward failures (token submission, polling errors)
    #[serde(default)]
    pub include_failures: bool,
    pub slack: Option<SlackConfig>,
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Name used in log messages
    pub name: String,
    pub url: String,
    /// "POST" (default) or "PUT"
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: ApiConfig {
                base_url: "http://localhost:5000/api".to_string(),
                timeout_secs: 30,
            },
            polling: PollingConfig {
                interval_secs: 30,
                novelty_policy: NoveltyPolicy::default(),
                summary_limit: 5,
                time_range: Some(TimeRange::LastDay),
                level: None,
                location_interval_secs: 300,
                tokens: Vec::new(),
            },
            alerting: AlertConfig::default(),
            output: OutputConfig {
                format: "console".to_string(),
                file_path: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
