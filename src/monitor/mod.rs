//! Per-trade price monitor
//!
//! Polls the exchange for the trade's symbol, drives the state machine in
//! [`state`], writes outcomes back to the sheet and dispatches cards.

pub mod state;

pub use state::{MonitorState, Transition};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::notify::Dispatcher;
use crate::resilience::{GuardedFeed, GuardedStore};
use crate::types::{normalize_symbol, CardKind, CellUpdate, Column, OutcomeKind, TradeRecord};

/// How a monitor run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    Closed(OutcomeKind),
    /// Too many consecutive price failures; the trade stays open in the sheet
    Aborted { failures: u32 },
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub failure_streak_limit: u32,
    pub quote_suffix: String,
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            failure_streak_limit: config.failure_streak_limit,
            quote_suffix: config.quote_suffix.to_uppercase(),
        }
    }
}

/// Shared dependencies for every monitor task
pub struct PriceMonitor {
    store: GuardedStore,
    feed: GuardedFeed,
    dispatcher: Arc<Dispatcher>,
    settings: MonitorSettings,
}

impl PriceMonitor {
    pub fn new(
        store: GuardedStore,
        feed: GuardedFeed,
        dispatcher: Arc<Dispatcher>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            feed,
            dispatcher,
            settings,
        }
    }

    /// Watch `trade` until it closes or the price feed keeps failing
    pub async fn run(self: Arc<Self>, mut trade: TradeRecord) -> MonitorExit {
        if MonitorState::of(&trade).is_terminal() {
            if let Some(outcome) = trade.outcome {
                return MonitorExit::Closed(outcome);
            }
        }

        self.correct_symbol(&mut trade).await;
        info!(
            trade_id = %trade.id,
            symbol = %trade.asset,
            side = %trade.side,
            entry = trade.entry,
            state = %MonitorState::of(&trade),
            "👀 Monitoring trade"
        );

        let mut failures: u32 = 0;
        loop {
            match self.feed.last_price(&trade.asset).await {
                Ok(quote) => {
                    if failures > 0 {
                        info!(trade_id = %trade.id, after = failures, "Price feed recovered");
                    }
                    failures = 0;
                    debug!(trade_id = %trade.id, price = quote.price, "Price tick");

                    if let Some(outcome) = self.on_price(&mut trade, quote.price).await {
                        info!(trade_id = %trade.id, outcome = %outcome, "🏁 Trade closed");
                        return MonitorExit::Closed(outcome);
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        trade_id = %trade.id,
                        symbol = %trade.asset,
                        source = self.feed.source(),
                        failures,
                        error = %e,
                        "Price fetch failed"
                    );
                    if failures >= self.settings.failure_streak_limit {
                        error!(
                            trade_id = %trade.id,
                            failures,
                            "Giving up on trade after consecutive price failures"
                        );
                        return MonitorExit::Aborted { failures };
                    }
                }
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Suffix appended to bare symbols; trade ids are built with the same rule
    pub fn quote_suffix(&self) -> &str {
        &self.settings.quote_suffix
    }

    /// Append the quote suffix to a bare symbol and persist the fix once
    async fn correct_symbol(&self, trade: &mut TradeRecord) {
        let symbol = trade.asset.trim().to_uppercase();
        let corrected = normalize_symbol(&symbol, &self.settings.quote_suffix);
        if corrected == symbol {
            trade.asset = symbol;
            return;
        }

        info!(trade_id = %trade.id, from = %trade.asset, to = %corrected, "Correcting symbol");
        let update = CellUpdate::new(Column::Asset, trade.row, corrected.as_str());
        match self.store.write_cells(&[update]).await {
            Ok(true) => {}
            Ok(false) => warn!(trade_id = %trade.id, "Symbol correction skipped by the sheet"),
            Err(e) => error!(trade_id = %trade.id, error = %e, "Failed to persist symbol correction"),
        }
        trade.asset = corrected;
    }

    /// Apply every transition `price` triggers. Returns the outcome once closed.
    async fn on_price(&self, trade: &mut TradeRecord, price: f64) -> Option<OutcomeKind> {
        while let Some(transition) = state::next_transition(trade, price) {
            info!(trade_id = %trade.id, price, transition = ?transition, "Transition");
            let effects = state::apply(trade, transition);
            self.persist(trade, &effects.updates).await;
            if let Some(kind) = effects.card {
                self.notify(trade, kind).await;
            }
            if MonitorState::of(trade).is_terminal() {
                return trade.outcome;
            }
        }
        None
    }

    async fn persist(&self, trade: &TradeRecord, updates: &[CellUpdate]) {
        match self.store.write_cells(updates).await {
            Ok(true) => {}
            Ok(false) => warn!(trade_id = %trade.id, cells = updates.len(), "Sheet write skipped"),
            Err(e) => error!(
                trade_id = %trade.id,
                cells = updates.len(),
                error = %e,
                "Sheet write failed"
            ),
        }
    }

    async fn notify(&self, trade: &TradeRecord, kind: CardKind) {
        if let Err(e) = self.dispatcher.dispatch(trade, kind).await {
            error!(trade_id = %trade.id, card = %kind, error = %e, "Card dispatch failed");
        }
    }
}
