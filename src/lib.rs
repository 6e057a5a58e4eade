//! TradeWatch Library
//!
//! Watches trade signals kept in a Google Sheet, tracks each open trade
//! against exchange prices and posts cards to a Telegram topic.

pub mod config;
pub mod error;
pub mod exchange;
pub mod ingest;
pub mod ledger;
pub mod monitor;
pub mod notify;
pub mod resilience;
pub mod scheduler;
pub mod sheets;
pub mod types;
