//! Configuration types and environment variable names

pub use super::{
    AppConfig, ExchangeConfig, IngestConfig, LedgerConfig, LoggingConfig, MonitorConfig, Secrets,
    SheetsConfig, TelegramConfig,
};

pub const ENV_SPREADSHEET_ID: &str = "SPREADSHEET_ID";
pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_TELEGRAM_TOPIC_ID: &str = "TELEGRAM_TOPIC_ID";
pub const ENV_GOOGLE_CREDENTIALS_PATH: &str = "GOOGLE_CREDENTIALS_PATH";
