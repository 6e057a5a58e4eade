//! Retrying wrappers, one per external dependency

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{retry, CredentialRefresh, RetryError, RetryPolicy};
use crate::error::ServiceError;
use crate::exchange::{PriceFeed, Quote};
use crate::notify::Notifier;
use crate::sheets::{Row, TradeStore};
use crate::types::CellUpdate;

struct StoreRefresh<'a>(&'a dyn TradeStore);

#[async_trait]
impl CredentialRefresh for StoreRefresh<'_> {
    async fn refresh_credentials(&self) -> Result<(), ServiceError> {
        self.0.refresh_credentials().await
    }
}

/// Tabular store behind the sheets policy
///
/// Bad-request and not-found failures come back as `Ok(None)` / `Ok(false)`:
/// the call had no effect and the caller carries on.
#[derive(Clone)]
pub struct GuardedStore {
    inner: Arc<dyn TradeStore>,
    policy: RetryPolicy,
}

impl GuardedStore {
    pub fn new(inner: Arc<dyn TradeStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub async fn read_rows(&self, range: &str) -> Result<Option<Vec<Row>>, RetryError> {
        let refresh = StoreRefresh(self.inner.as_ref());
        match retry(&self.policy, Some(&refresh), || self.inner.read_rows(range)).await {
            Ok(rows) => Ok(Some(rows)),
            Err(RetryError::Skipped(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns false when the write was skipped
    pub async fn write_cells(&self, updates: &[CellUpdate]) -> Result<bool, RetryError> {
        if updates.is_empty() {
            return Ok(true);
        }
        let refresh = StoreRefresh(self.inner.as_ref());
        match retry(&self.policy, Some(&refresh), || self.inner.write_cells(updates)).await {
            Ok(()) => Ok(true),
            Err(RetryError::Skipped(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Exchange quotes behind the exchange policy
#[derive(Clone)]
pub struct GuardedFeed {
    inner: Arc<dyn PriceFeed>,
    policy: RetryPolicy,
}

impl GuardedFeed {
    pub fn new(inner: Arc<dyn PriceFeed>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Name of the quote source behind the wrapper
    pub fn source(&self) -> &'static str {
        self.inner.name()
    }

    pub async fn last_price(&self, symbol: &str) -> Result<Quote, RetryError> {
        retry(&self.policy, None, || self.inner.last_price(symbol)).await
    }
}

/// Notification channel behind the telegram policy
#[derive(Clone)]
pub struct GuardedNotifier {
    inner: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl GuardedNotifier {
    pub fn new(inner: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub async fn send_photo_url(&self, caption: &str, url: &str) -> Result<(), RetryError> {
        retry(&self.policy, None, || self.inner.send_photo_url(caption, url)).await
    }

    pub async fn send_photo_file(&self, caption: &str, path: &Path) -> Result<(), RetryError> {
        retry(&self.policy, None, || self.inner.send_photo_file(caption, path)).await
    }

    /// Single download attempt used by the image fallback
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        self.inner.fetch_image(url).await
    }
}
