//! Bybit REST client for last-traded prices
//!
//! Uses the V5 public market tickers endpoint (linear perpetuals by default).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{PriceFeed, Quote};
use crate::error::ServiceError;

const SERVICE: &str = "bybit";

#[derive(Debug, Clone, Deserialize)]
struct TickersResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<TickersResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct TickersResult {
    #[serde(default)]
    list: Vec<Ticker>,
}

#[derive(Debug, Clone, Deserialize)]
struct Ticker {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
}

#[derive(Debug, Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    category: String,
}

impl BybitClient {
    pub fn new(client: Client, base_url: &str, category: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            category: category.to_string(),
        }
    }

    fn tickers_url(&self, symbol: &str) -> String {
        format!(
            "{}/v5/market/tickers?category={}&symbol={}",
            self.base_url, self.category, symbol
        )
    }
}

#[async_trait]
impl PriceFeed for BybitClient {
    fn name(&self) -> &'static str {
        "Bybit"
    }

    async fn last_price(&self, symbol: &str) -> Result<Quote, ServiceError> {
        let response = self
            .client
            .get(self.tickers_url(symbol))
            .send()
            .await
            .map_err(ServiceError::transport(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = ServiceError::retry_after_header(response.headers());
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                service: SERVICE,
                status: status.as_u16(),
                reason: None,
                retry_after,
                message,
            });
        }

        let body: TickersResponse = response.json().await.map_err(ServiceError::decode(SERVICE))?;
        parse_tickers(body)
    }
}

fn parse_tickers(body: TickersResponse) -> Result<Quote, ServiceError> {
    if body.ret_code != 0 {
        return Err(ServiceError::Api {
            service: SERVICE,
            code: body.ret_code,
            message: body.ret_msg,
            retry_after: None,
        });
    }

    let ticker = body
        .result
        .and_then(|r| r.list.into_iter().next())
        .ok_or_else(|| ServiceError::Decode {
            service: SERVICE,
            message: "empty ticker list".to_string(),
        })?;

    let price = ticker
        .last_price
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .ok_or_else(|| ServiceError::Decode {
            service: SERVICE,
            message: format!("invalid lastPrice {:?}", ticker.last_price),
        })?;

    Ok(Quote {
        symbol: ticker.symbol,
        price,
    })
}
