use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    CONNECT_TIMEOUT_SECS, LIST_WINDOW_DAYS, MAX_RECONNECT_ATTEMPTS, MAX_RECONNECT_DELAY_SECS,
    OPERATION_TIMEOUT_SECS, POLL_INTERVAL_SECS, PREVIEW_LENGTH, RECONNECT_DELAY_SECS,
};

const ENV_CONFIG: &str = "MAILSIFT_CONFIG";
const ENV_SLACK_WEBHOOK: &str = "MAILSIFT_SLACK_WEBHOOK_URL";
const ENV_OPENAI_KEY: &str = "MAILSIFT_OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Chat alerts for interested replies
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Reply generation (OpenAI-compatible endpoint)
    #[serde(default)]
    pub reply: ReplyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub user: String,
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
    /// Verify server certificates. Off by default so self-signed servers work.
    #[serde(default)]
    pub strict_tls: bool,
    /// Inline secret; prefer the environment or keyring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_preview_length")]
    pub preview_length: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            window_days: default_window_days(),
            preview_length: default_preview_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_max_reconnect_delay_secs")]
    pub max_reconnect_delay_secs: u64,
    /// 0 = retry forever
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_delay_secs: default_max_reconnect_delay_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_reply_model")]
    pub model: String,
    #[serde(default = "default_reply_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_reply_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_reply_temperature")]
    pub temperature: f32,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_reply_model(),
            endpoint: default_reply_endpoint(),
            max_tokens: default_reply_max_tokens(),
            temperature: default_reply_temperature(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    POLL_INTERVAL_SECS
}

fn default_window_days() -> i64 {
    LIST_WINDOW_DAYS
}

fn default_preview_length() -> usize {
    PREVIEW_LENGTH
}

fn default_connect_timeout_secs() -> u64 {
    CONNECT_TIMEOUT_SECS
}

fn default_operation_timeout_secs() -> u64 {
    OPERATION_TIMEOUT_SECS
}

fn default_reconnect_delay_secs() -> u64 {
    RECONNECT_DELAY_SECS
}

fn default_max_reconnect_delay_secs() -> u64 {
    MAX_RECONNECT_DELAY_SECS
}

fn default_max_reconnect_attempts() -> u32 {
    MAX_RECONNECT_ATTEMPTS
}

fn default_reply_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_reply_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_reply_max_tokens() -> u32 {
    300
}

fn default_reply_temperature() -> f32 {
    0.7
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("mailsift");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = env::var(ENV_CONFIG) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("Could not find data directory")?
            .join("mailsift");
        Ok(dir)
    }

    /// Get account by id
    pub fn account(&self, id: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            anyhow::bail!(
                "Configuration file not found at {}\n\
                 Please create a config file. Example:\n\n\
                 [[accounts]]\n\
                 id = \"account1\"\n\
                 user = \"you@example.com\"\n\
                 host = \"imap.example.com\"\n\n\
                 [notifications]\n\
                 slack_webhook_url = \"https://hooks.slack.com/services/...\"",
                path.display()
            );
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            anyhow::bail!("At least one [[accounts]] entry is required");
        }
        for (i, account) in self.accounts.iter().enumerate() {
            if account.id.trim().is_empty() {
                anyhow::bail!("Account #{} has an empty id", i + 1);
            }
            if self.accounts[..i].iter().any(|a| a.id == account.id) {
                anyhow::bail!("Duplicate account id '{}'", account.id);
            }
        }
        if self.polling.interval_secs == 0 {
            anyhow::bail!("polling.interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Secrets from the environment win over the file.
    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(ENV_SLACK_WEBHOOK) {
            self.notifications.slack_webhook_url = Some(url);
        }
        if let Some(key) = non_empty_env(ENV_OPENAI_KEY) {
            self.reply.api_key = Some(key);
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(Self::config_dir()?)?;
        fs::create_dir_all(Self::data_dir()?)?;
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
