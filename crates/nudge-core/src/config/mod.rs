mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::NudgeError;
use defaults::*;

/// Top-level Nudge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nudge: NudgeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub linking: LinkingConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Row store / ledger database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Telegram bot config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    /// Without the `@`. Empty = ask the Bot API (`getMe`) at startup.
    #[serde(default)]
    pub bot_username: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls. Empty = unchecked.
    #[serde(default)]
    pub webhook_secret: String,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Bearer token for the user-facing endpoints. Empty = no auth (local only).
    #[serde(default)]
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
            api_key: String::new(),
        }
    }
}

/// External cron trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronConfig {
    /// Bearer secret the trigger must present. Empty = the trigger is refused.
    #[serde(default)]
    pub secret: String,
}

/// In-process sweep over all users (Telegram only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_sweep_window")]
    pub window_minutes: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_sweep_interval(),
            window_minutes: default_sweep_window(),
        }
    }
}

/// Per-session client poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_window")]
    pub window_minutes: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            window_minutes: default_poll_window(),
        }
    }
}

/// Transport behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Upper bound on a single channel send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Telegram link tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingConfig {
    #[serde(default = "default_link_ttl_minutes")]
    pub ttl_minutes: i64,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_link_ttl_minutes(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file, then apply environment overrides.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, NudgeError> {
    let mut config = read_file(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_file(path: &str) -> Result<Config, NudgeError> {
    let path = Path::new(path);
    if !path.exists() {
        info!("Config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| NudgeError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    toml::from_str(&content).map_err(|e| NudgeError::Config(format!("failed to parse config: {e}")))
}

/// Secrets usually come from the environment rather than the file.
pub(crate) fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
        config.telegram.bot_token = token;
        config.telegram.enabled = true;
    }
    if let Some(secret) = non_empty("TELEGRAM_WEBHOOK_SECRET") {
        config.telegram.webhook_secret = secret;
    }
    if let Some(secret) = non_empty("NUDGE_CRON_SECRET") {
        config.cron.secret = secret;
    }
    if let Some(key) = non_empty("NUDGE_API_KEY") {
        config.api.api_key = key;
    }
}
