//! Exchange quote source
//!
//! Read-only last-price lookups for the monitor.

mod bybit;

pub use bybit::BybitClient;

use async_trait::async_trait;

use crate::error::ServiceError;

/// Last traded price for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
}

/// Trait for quote source clients
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    async fn last_price(&self, symbol: &str) -> Result<Quote, ServiceError>;
}
