use crate::{Error, Result};

/// Process configuration loaded from environment variables at startup.
/// Durable, operator-editable settings live in [`crate::settings`].
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Dashboard
    pub dashboard_port: u16,
    /// Bearer token for `/api/*`. Auth is disabled when unset.
    pub dashboard_token: Option<String>,

    // Telegram
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,

    // Files
    pub settings_path: String,
    pub strategy_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let telegram_chat_ids = match optional_env("TELEGRAM_CHAT_IDS") {
            Some(raw) => parse_chat_ids(&raw)?,
            None => Vec::new(),
        };

        Ok(Config {
            database_url: required_env("DATABASE_URL")?,
            dashboard_port: optional_env("DASHBOARD_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            dashboard_token: optional_env("DASHBOARD_TOKEN").filter(|t| !t.is_empty()),
            telegram_token: optional_env("TELEGRAM_TOKEN").filter(|t| !t.is_empty()),
            telegram_chat_ids,
            settings_path: optional_env("SETTINGS_PATH")
                .unwrap_or_else(|| "data/settings.json".to_string()),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
        })
    }

    /// Alerts and operator commands need both a bot token and at least one chat.
    pub fn telegram_enabled(&self) -> bool {
        self.telegram_token.is_some() && !self.telegram_chat_ids.is_empty()
    }
}

fn parse_chat_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                Error::Config(format!("TELEGRAM_CHAT_IDS contains non-numeric ID: '{s}'"))
            })
        })
        .collect()
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
