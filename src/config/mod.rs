//! Configuration management for TradeWatch
//!
//! Loads defaults, optional config files and environment variables via .env.
//! Deployment secrets (sheet id, Telegram credentials) come from plain
//! environment variables and are validated separately.

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub ingest: IngestConfig,
    pub sheets: SheetsConfig,
    pub telegram: TelegramConfig,
    pub exchange: ExchangeConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Maximum monitors polling at the same time
    pub concurrency_limit: usize,
    /// Delay between price polls in milliseconds
    pub poll_interval_ms: u64,
    /// Consecutive failed price fetches before a monitor gives up
    pub failure_streak_limit: u32,
    /// Quote currency every exchange symbol must end with
    pub quote_suffix: String,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// A1 range holding the trade rows (without header)
    pub range: String,
    /// Sheet row number of the first row in `range`
    pub first_row: u32,
    /// Newest-row check interval in milliseconds
    pub new_entry_interval_ms: u64,
    /// Full rescan interval in seconds (0 disables)
    pub rescan_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    pub api_url: String,
    pub token_url: String,
    pub credentials_path: String,
    pub token_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub api_url: String,
    /// Bybit product category (linear, spot, inverse)
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub path: String,
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Per-deployment values that must be present in the environment
#[derive(Clone)]
pub struct Secrets {
    pub spreadsheet_id: String,
    pub telegram_token: String,
    pub telegram_chat_id: i64,
    pub telegram_topic_id: i64,
    pub credentials_path: Option<PathBuf>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("telegram_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_topic_id", &self.telegram_topic_id)
            .field("credentials_path", &self.credentials_path)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Monitor defaults
            .set_default("monitor.concurrency_limit", 60)?
            .set_default("monitor.poll_interval_ms", 1000)?
            .set_default("monitor.failure_streak_limit", 10)?
            .set_default("monitor.quote_suffix", "USDT")?
            // Ingestion defaults
            .set_default("ingest.range", "A2:R")?
            .set_default("ingest.first_row", 2)?
            .set_default("ingest.new_entry_interval_ms", 2000)?
            .set_default("ingest.rescan_interval_secs", 300)?
            // Google defaults
            .set_default("sheets.api_url", "https://sheets.googleapis.com")?
            .set_default("sheets.token_url", "https://oauth2.googleapis.com/token")?
            .set_default("sheets.credentials_path", "secrets/client_secret.json")?
            .set_default("sheets.token_path", "secrets/token.json")?
            // Telegram defaults
            .set_default("telegram.api_url", "https://api.telegram.org")?
            // Exchange defaults
            .set_default("exchange.api_url", "https://api.bybit.com")?
            .set_default("exchange.category", "linear")?
            // Ledger defaults
            .set_default("ledger.path", "data/sent_trades.json")?
            .set_default("ledger.capacity", 1000)?
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (TRADEWATCH__*)
            .add_source(Environment::with_prefix("TRADEWATCH").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.concurrency_limit == 0 {
            bail!("monitor.concurrency_limit must be at least 1");
        }
        if self.monitor.failure_streak_limit == 0 {
            bail!("monitor.failure_streak_limit must be at least 1");
        }
        if self.ingest.first_row == 0 {
            bail!("ingest.first_row is 1-based");
        }
        Ok(())
    }

    /// Read the required deployment values from the environment
    pub fn secrets(&self) -> Result<Secrets> {
        Secrets::from_lookup(|key| std::env::var(key).ok())
    }

    /// Credentials file, with `GOOGLE_CREDENTIALS_PATH` taking precedence
    pub fn credentials_path(&self, secrets: &Secrets) -> PathBuf {
        secrets
            .credentials_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.sheets.credentials_path))
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "concurrency={} poll={}ms streak_limit={} range={} rescan={}s ledger={} cap={}",
            self.monitor.concurrency_limit,
            self.monitor.poll_interval_ms,
            self.monitor.failure_streak_limit,
            self.ingest.range,
            self.ingest.rescan_interval_secs,
            self.ledger.path,
            self.ledger.capacity
        )
    }
}

impl Secrets {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ => bail!("Required environment variable {} is not set", key),
            }
        };
        let integer = |key: &str| -> Result<i64> {
            required(key)?
                .parse::<i64>()
                .with_context(|| format!("{} must be an integer", key))
        };

        Ok(Self {
            spreadsheet_id: required(ENV_SPREADSHEET_ID)?,
            telegram_token: required(ENV_TELEGRAM_TOKEN)?,
            telegram_chat_id: integer(ENV_TELEGRAM_CHAT_ID)?,
            telegram_topic_id: integer(ENV_TELEGRAM_TOPIC_ID)?,
            credentials_path: lookup(ENV_GOOGLE_CREDENTIALS_PATH)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_secrets_require_every_value() {
        let full = env(&[
            ("SPREADSHEET_ID", "sheet"),
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-1001234"),
            ("TELEGRAM_TOPIC_ID", "7"),
        ]);
        let secrets = Secrets::from_lookup(|k| full.get(k).cloned()).unwrap();
        assert_eq!(secrets.telegram_chat_id, -1001234);
        assert_eq!(secrets.telegram_topic_id, 7);
        assert!(secrets.credentials_path.is_none());
        assert!(!format!("{:?}", secrets).contains("123:abc"));

        let missing = env(&[("SPREADSHEET_ID", "sheet"), ("TELEGRAM_TOKEN", "t")]);
        let err = Secrets::from_lookup(|k| missing.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_CHAT_ID"));
    }

    #[test]
    fn test_secrets_reject_non_numeric_ids() {
        let bad = env(&[
            ("SPREADSHEET_ID", "sheet"),
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "chat"),
            ("TELEGRAM_TOPIC_ID", "7"),
        ]);
        let err = Secrets::from_lookup(|k| bad.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_CHAT_ID must be an integer"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let blank = env(&[
            ("SPREADSHEET_ID", "  "),
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "1"),
            ("TELEGRAM_TOPIC_ID", "2"),
        ]);
        assert!(Secrets::from_lookup(|k| blank.get(k).cloned()).is_err());
    }
}
