//! Trade ingestion from the sheet
//!
//! Turns raw rows into `TradeRecord`s, filters the open ones and hands them
//! to the scheduler after the open card went out.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::monitor::PriceMonitor;
use crate::notify::{Delivery, Dispatcher};
use crate::resilience::GuardedStore;
use crate::scheduler::{AdmitOutcome, MonitorScheduler};
use crate::sheets::Row;
use crate::types::{normalize_symbol, CardKind, OutcomeKind, Side, TradeId, TradeRecord};

/// Columns A..R
const ROW_WIDTH: usize = 18;

mod col {
    pub const TIMESTAMP: usize = 0;
    pub const TRADER: usize = 1;
    pub const ASSET: usize = 2;
    pub const CATEGORY: usize = 3;
    pub const SIDE: usize = 4;
    pub const ENTRY: usize = 5;
    pub const LEVERAGE: usize = 6;
    pub const STOP: usize = 7;
    pub const STOP_PCT: usize = 8;
    pub const TARGET1: usize = 9;
    pub const TARGET1_RESULT: usize = 10;
    pub const TARGET2: usize = 11;
    pub const TARGET2_RESULT: usize = 12;
    pub const IMAGE: usize = 13;
    pub const ANALYSIS: usize = 14;
    pub const FINAL_RESULT: usize = 15;
    pub const STATUS: usize = 16;
    pub const OUTCOME: usize = 17;
}

/// Parse a numeric cell; accepts surrounding whitespace and a decimal comma
pub fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Convert one sheet row. Missing required numbers become 0, missing
/// optional ones stay absent. `quote_suffix` only feeds the trade id; the
/// asset cell is kept as written.
pub fn parse_row(row: &[String], row_number: u32, quote_suffix: &str) -> TradeRecord {
    let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");
    let number = |i: usize| parse_number(cell(i)).unwrap_or(0.0);
    let optional = |i: usize| parse_number(cell(i));

    let status = cell(col::STATUS).to_string();
    TradeRecord {
        id: TradeId::compose(
            cell(col::TIMESTAMP),
            cell(col::TRADER),
            &normalize_symbol(cell(col::ASSET), quote_suffix),
            row_number,
        ),
        row: row_number,
        timestamp: cell(col::TIMESTAMP).to_string(),
        trader: cell(col::TRADER).to_string(),
        asset: cell(col::ASSET).to_string(),
        category: cell(col::CATEGORY).to_string(),
        side: Side::from_cell(&cell(col::SIDE).to_lowercase()),
        entry: number(col::ENTRY),
        leverage: number(col::LEVERAGE),
        stop: number(col::STOP),
        stop_pct: number(col::STOP_PCT),
        target1: number(col::TARGET1),
        target1_pnl: optional(col::TARGET1_RESULT),
        // A zero target2 means the trade has a single target
        target2: optional(col::TARGET2).filter(|v| *v != 0.0),
        target2_pnl: optional(col::TARGET2_RESULT),
        image: cell(col::IMAGE).to_string(),
        analysis: cell(col::ANALYSIS).to_string(),
        final_pnl: optional(col::FINAL_RESULT),
        closed: !status.is_empty(),
        outcome: OutcomeKind::from_sheet_label(cell(col::OUTCOME)),
        status,
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().take(ROW_WIDTH).all(|c| c.trim().is_empty())
}

/// Open trades among `rows`, where `rows[0]` is sheet row `first_row`
pub fn open_trades(rows: &[Row], first_row: u32, quote_suffix: &str) -> Vec<TradeRecord> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| !is_blank(row))
        .map(|(i, row)| parse_row(row, first_row + i as u32, quote_suffix))
        .filter(|trade| !trade.closed)
        .collect()
}

/// The last row of `rows`, if it holds an open trade
pub fn newest_open_trade(rows: &[Row], first_row: u32, quote_suffix: &str) -> Option<TradeRecord> {
    let (last, row) = rows.len().checked_sub(1).map(|i| (i, &rows[i]))?;
    if is_blank(row) {
        return None;
    }
    Some(parse_row(row, first_row + last as u32, quote_suffix)).filter(|trade| !trade.closed)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub rows: usize,
    pub open: usize,
    pub admitted: usize,
}

/// Handle to the spawned ingestion loops
pub struct IngestTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl IngestTask {
    /// Signal the loops to stop and wait up to `grace` for the current
    /// check to finish. Returns false when the task had to be aborted.
    pub async fn stop(mut self, grace: Duration) -> bool {
        self.shutdown.send_replace(true);
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Ingestion task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Ingestion did not stop in time, aborting"
                );
                self.handle.abort();
                false
            }
        }
    }
}

pub struct Ingestor {
    store: GuardedStore,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<MonitorScheduler>,
    monitor: Arc<PriceMonitor>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        store: GuardedStore,
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<MonitorScheduler>,
        monitor: Arc<PriceMonitor>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            scheduler,
            monitor,
            config,
        }
    }

    async fn read_rows(&self) -> Result<Vec<Row>> {
        match self.store.read_rows(&self.config.range).await? {
            Some(rows) => Ok(rows),
            None => {
                warn!(range = %self.config.range, "Sheet read skipped");
                Ok(Vec::new())
            }
        }
    }

    /// Admit every open trade in the sheet
    pub async fn full_scan(&self) -> Result<ScanReport> {
        let rows = self.read_rows().await?;
        let trades = open_trades(&rows, self.config.first_row, self.monitor.quote_suffix());
        let mut report = ScanReport {
            rows: rows.len(),
            open: trades.len(),
            admitted: 0,
        };

        for trade in trades {
            if self.enqueue(trade).await {
                report.admitted += 1;
            }
        }

        info!(
            rows = report.rows,
            open = report.open,
            admitted = report.admitted,
            active = self.scheduler.active_count(),
            limit = self.scheduler.limit(),
            "📋 Sheet scan complete"
        );
        Ok(report)
    }

    /// Look only at the last row for a freshly appended trade
    pub async fn check_newest(&self) -> Result<bool> {
        let rows = self.read_rows().await?;
        match newest_open_trade(&rows, self.config.first_row, self.monitor.quote_suffix()) {
            Some(trade) => Ok(self.enqueue(trade).await),
            None => Ok(false),
        }
    }

    /// Send the open card and admit the trade. Returns true when admitted.
    async fn enqueue(&self, trade: TradeRecord) -> bool {
        if self.scheduler.is_tracked(&trade.id) {
            return false;
        }

        match self.dispatcher.dispatch(&trade, CardKind::Open).await {
            Ok(Delivery::Sent) => info!(trade_id = %trade.id, asset = %trade.asset, "🆕 New trade"),
            Ok(Delivery::AlreadySent) => {
                debug!(trade_id = %trade.id, "Open card already delivered, resuming monitor")
            }
            Err(e) => error!(trade_id = %trade.id, error = %e, "Open card dispatch failed"),
        }

        let id = trade.id.clone();
        let monitor = self.monitor.clone();
        match self.scheduler.admit(trade, move |t| monitor.run(t)) {
            AdmitOutcome::Admitted => true,
            other => {
                debug!(trade_id = %id, outcome = ?other, "Trade not admitted");
                false
            }
        }
    }

    /// Run [`Ingestor::run`] on its own task
    pub fn spawn(self: Arc<Self>) -> IngestTask {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { self.run(rx).await });
        IngestTask { shutdown, handle }
    }

    /// Newest-row check and periodic rescan until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut newest = tokio::time::interval(Duration::from_millis(
            self.config.new_entry_interval_ms.max(1),
        ));
        let rescan_every = Duration::from_secs(self.config.rescan_interval_secs);
        let mut rescan = tokio::time::interval(rescan_every.max(Duration::from_secs(1)));
        newest.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The startup scan already ran; skip the immediate first ticks
        newest.tick().await;
        rescan.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Ingestion stopped");
                        return;
                    }
                }
                _ = newest.tick() => {
                    if let Err(e) = self.check_newest().await {
                        warn!(error = %e, "Newest-row check failed");
                    }
                }
                _ = rescan.tick(), if !rescan_every.is_zero() => {
                    if let Err(e) = self.full_scan().await {
                        warn!(error = %e, "Periodic rescan failed");
                    }
                }
            }
        }
    }
}
