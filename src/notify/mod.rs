//! Notification dispatch
//!
//! Renders trade cards, delivers them with an image, and records successful
//! deliveries in the ledger so a card of a given kind goes out at most once.

pub mod card;
mod telegram;

pub use telegram::TelegramClient;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::ServiceError;
use crate::ledger::DeliveryLedger;
use crate::resilience::GuardedNotifier;
use crate::types::{CardKind, TradeRecord};

/// Notification channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a photo by URL with an HTML caption
    async fn send_photo_url(&self, caption: &str, url: &str) -> Result<(), ServiceError>;

    /// Upload a local image file with an HTML caption
    async fn send_photo_file(&self, caption: &str, path: &Path) -> Result<(), ServiceError>;

    /// Download an image so it can be re-uploaded
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Result of a dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The ledger already holds this card; nothing was sent
    AlreadySent,
}

pub struct Dispatcher {
    notifier: GuardedNotifier,
    ledger: Mutex<DeliveryLedger>,
}

impl Dispatcher {
    pub fn new(notifier: GuardedNotifier, ledger: DeliveryLedger) -> Self {
        Self {
            notifier,
            ledger: Mutex::new(ledger),
        }
    }

    pub fn already_sent(&self, trade: &TradeRecord, kind: CardKind) -> bool {
        self.ledger
            .lock()
            .map(|ledger| ledger.contains(&trade.id, kind))
            .unwrap_or(false)
    }

    /// Send the `kind` card for `trade` unless the ledger already has it.
    /// The ledger is only updated after a successful send.
    pub async fn dispatch(&self, trade: &TradeRecord, kind: CardKind) -> Result<Delivery> {
        if self.already_sent(trade, kind) {
            info!(trade_id = %trade.id, card = %kind, "Card already delivered, skipping");
            return Ok(Delivery::AlreadySent);
        }

        let caption = card::render_caption(trade, kind);
        self.deliver(&caption, &trade.image)
            .await
            .with_context(|| format!("Failed to deliver {} card for {}", kind, trade.id))?;

        let mut ledger = self
            .ledger
            .lock()
            .map_err(|_| anyhow::anyhow!("delivery ledger lock poisoned"))?;
        ledger.record(&trade.id, kind);
        if let Err(e) = ledger.save() {
            error!(error = %e, "Failed to persist delivery ledger");
        }
        info!(trade_id = %trade.id, card = %kind, "📨 Card delivered");
        Ok(Delivery::Sent)
    }

    async fn deliver(&self, caption: &str, image: &str) -> Result<()> {
        let url = card::direct_image_url(image);
        let direct = match self.notifier.send_photo_url(caption, &url).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if url.is_empty() {
            return Err(direct.into());
        }

        warn!(error = %direct, url = %url, "Direct photo send failed, re-uploading image");
        self.reupload(caption, &url)
            .await
            .context("Image fallback failed")
    }

    async fn reupload(&self, caption: &str, url: &str) -> Result<()> {
        let bytes = self.notifier.fetch_image(url).await?;

        // Removed when `file` drops, whichever way this returns.
        let mut file = tempfile::Builder::new()
            .prefix("trade_")
            .suffix(".jpg")
            .tempfile()
            .context("Failed to create temporary image file")?;
        file.write_all(&bytes)?;
        file.flush()?;

        self.notifier.send_photo_file(caption, file.path()).await?;
        Ok(())
    }
}
