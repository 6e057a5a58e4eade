//! Core types used throughout TradeWatch
//!
//! Defines the trade record derived from a sheet row, its identity, and the
//! cell addresses the monitor writes back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status value written to the sheet when a trade is closed
pub const STATUS_CLOSED: &str = "Encerrado";

/// Exchange symbol for an asset cell: trimmed, upper-cased and ending in
/// `quote_suffix`
pub fn normalize_symbol(asset: &str, quote_suffix: &str) -> String {
    let symbol = asset.trim().to_uppercase();
    let suffix = quote_suffix.trim().to_uppercase();
    if symbol.ends_with(&suffix) {
        symbol
    } else {
        format!("{}{}", symbol, suffix)
    }
}

/// Deterministic identity of a trade row
///
/// Composed from timestamp, trader, normalized symbol and row number. Two rows
/// with the same first three parts only collide when they also share the row
/// number. The symbol is normalized so the id survives the one-time symbol
/// correction written back to the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(String);

impl TradeId {
    pub fn compose(timestamp: &str, trader: &str, asset: &str, row: u32) -> Self {
        Self(format!("{}::{}::{}::{}", timestamp, trader, asset, row))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TradeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Anything other than "long" is monitored as a short
    pub fn from_cell(cell: &str) -> Self {
        if cell.trim().eq_ignore_ascii_case("long") {
            Side::Long
        } else {
            Side::Short
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Side::Long)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// How a trade ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Target1 (no target2) or target2 reached
    Profit,
    /// Stop hit after target1 was already banked; closed without a card
    PartialProfit,
    /// Stop hit before any target
    StopLoss,
}

impl OutcomeKind {
    /// Value written to the outcome-kind column
    pub fn sheet_label(&self) -> &'static str {
        match self {
            OutcomeKind::Profit | OutcomeKind::PartialProfit => "Profit",
            OutcomeKind::StopLoss => "Stop Loss",
        }
    }

    pub fn from_sheet_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Profit" => Some(OutcomeKind::Profit),
            "Stop Loss" => Some(OutcomeKind::StopLoss),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Profit => write!(f, "PROFIT"),
            OutcomeKind::PartialProfit => write!(f, "PARTIAL_PROFIT"),
            OutcomeKind::StopLoss => write!(f, "STOP_LOSS"),
        }
    }
}

/// Kind of notification card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardKind {
    Open,
    Target1,
    Close,
}

impl CardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardKind::Open => "open",
            CardKind::Target1 => "target1",
            CardKind::Close => "close",
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sheet columns the monitor writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Asset,
    Target1Result,
    Target2Result,
    FinalResult,
    Status,
    OutcomeKind,
}

impl Column {
    pub fn letter(&self) -> char {
        match self {
            Column::Asset => 'C',
            Column::Target1Result => 'K',
            Column::Target2Result => 'M',
            Column::FinalResult => 'P',
            Column::Status => 'Q',
            Column::OutcomeKind => 'R',
        }
    }
}

/// A single-cell write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellUpdate {
    pub range: String,
    pub value: String,
}

impl CellUpdate {
    pub fn new(column: Column, row: u32, value: impl Into<String>) -> Self {
        Self {
            range: format!("{}{}", column.letter(), row),
            value: value.into(),
        }
    }

    /// PnL cells are written with two decimals
    pub fn pnl(column: Column, row: u32, pnl: f64) -> Self {
        Self::new(column, row, format!("{:.2}", pnl))
    }
}

/// One monitored trade, parsed from a sheet row
///
/// Static fields never change after parsing (apart from the one-time symbol
/// correction). Outcome fields only move forward: realized PnL values are
/// set once, and `closed` is final.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: TradeId,
    /// 1-based sheet row number
    pub row: u32,
    pub timestamp: String,
    pub trader: String,
    pub asset: String,
    pub category: String,
    pub side: Side,
    pub entry: f64,
    pub leverage: f64,
    pub stop: f64,
    pub stop_pct: f64,
    pub target1: f64,
    pub target1_pnl: Option<f64>,
    pub target2: Option<f64>,
    pub target2_pnl: Option<f64>,
    pub image: String,
    pub analysis: String,
    pub final_pnl: Option<f64>,
    pub status: String,
    pub outcome: Option<OutcomeKind>,
    pub closed: bool,
}

impl TradeRecord {
    /// Leveraged PnL in percent at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        if self.entry == 0.0 {
            return 0.0;
        }
        let moved = match self.side {
            Side::Long => price - self.entry,
            Side::Short => self.entry - price,
        };
        moved / self.entry * 100.0 * self.leverage
    }

    pub fn stop_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop,
            Side::Short => price >= self.stop,
        }
    }

    pub fn target1_hit(&self, price: f64) -> bool {
        self.target1_pnl.is_none() && self.level_reached(self.target1, price)
    }

    pub fn target2_hit(&self, price: f64) -> bool {
        match self.target2 {
            Some(level) => {
                self.target1_pnl.is_some()
                    && self.target2_pnl.is_none()
                    && self.level_reached(level, price)
            }
            None => false,
        }
    }

    fn level_reached(&self, level: f64, price: f64) -> bool {
        match self.side {
            Side::Long => price >= level,
            Side::Short => price <= level,
        }
    }

    /// Record target1 PnL. Returns false when it was already set.
    pub fn record_target1(&mut self, pnl: f64) -> bool {
        if self.target1_pnl.is_some() {
            return false;
        }
        self.target1_pnl = Some(pnl);
        true
    }

    /// Record target2 PnL. Returns false when it was already set.
    pub fn record_target2(&mut self, pnl: f64) -> bool {
        if self.target2_pnl.is_some() {
            return false;
        }
        self.target2_pnl = Some(pnl);
        true
    }

    /// Mark the trade closed. Returns false when it was already closed.
    pub fn close(&mut self, final_pnl: f64, outcome: OutcomeKind) -> bool {
        if self.closed {
            return false;
        }
        self.final_pnl = Some(final_pnl);
        self.outcome = Some(outcome);
        self.status = STATUS_CLOSED.to_string();
        self.closed = true;
        true
    }

    pub fn has_target2(&self) -> bool {
        self.target2.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_trade(
        side: Side,
        entry: f64,
        stop: f64,
        t1: f64,
        t2: Option<f64>,
    ) -> TradeRecord {
        TradeRecord {
            id: TradeId::compose("2024-05-01 10:00", "alice", "BTCUSDT", 2),
            row: 2,
            timestamp: "2024-05-01 10:00".to_string(),
            trader: "alice".to_string(),
            asset: "BTCUSDT".to_string(),
            category: "Crypto".to_string(),
            side,
            entry,
            leverage: 1.0,
            stop,
            stop_pct: 0.0,
            target1: t1,
            target1_pnl: None,
            target2: t2,
            target2_pnl: None,
            image: String::new(),
            analysis: String::new(),
            final_pnl: None,
            status: String::new(),
            outcome: None,
            closed: false,
        }
    }

    #[test]
    fn test_trade_id_is_composite() {
        let id = TradeId::compose("t", "bob", "ETHUSDT", 7);
        assert_eq!(id.as_str(), "t::bob::ETHUSDT::7");
        assert_ne!(id, TradeId::compose("t", "bob", "ETHUSDT", 8));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" sol ", "USDT"), "SOLUSDT");
        assert_eq!(normalize_symbol("ethusdt", "USDT"), "ETHUSDT");
        assert_eq!(normalize_symbol("BTCUSDT", "usdt"), "BTCUSDT");
    }

    #[test]
    fn test_pnl_is_side_aware() {
        let mut long = make_trade(Side::Long, 100.0, 90.0, 110.0, None);
        long.leverage = 10.0;
        assert!((long.pnl_at(112.0) - 120.0).abs() < 1e-9);

        let short = make_trade(Side::Short, 100.0, 105.0, 90.0, None);
        assert!((short.pnl_at(88.0) - 12.0).abs() < 1e-9);
        assert!((short.pnl_at(102.0) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_levels_by_side() {
        let long = make_trade(Side::Long, 100.0, 90.0, 110.0, Some(120.0));
        assert!(long.stop_hit(90.0));
        assert!(!long.stop_hit(90.5));
        assert!(long.target1_hit(110.0));
        // target2 is gated on target1 being recorded
        assert!(!long.target2_hit(125.0));

        let short = make_trade(Side::Short, 100.0, 105.0, 90.0, Some(80.0));
        assert!(short.stop_hit(105.0));
        assert!(short.target1_hit(88.0));
        assert!(!short.target1_hit(91.0));
    }

    #[test]
    fn test_outcome_fields_are_write_once() {
        let mut trade = make_trade(Side::Long, 100.0, 90.0, 110.0, Some(120.0));
        assert!(trade.record_target1(10.0));
        assert!(!trade.record_target1(15.0));
        assert_eq!(trade.target1_pnl, Some(10.0));

        assert!(trade.close(10.0, OutcomeKind::PartialProfit));
        assert!(!trade.close(-5.0, OutcomeKind::StopLoss));
        assert_eq!(trade.final_pnl, Some(10.0));
        assert_eq!(trade.status, STATUS_CLOSED);
    }

    #[test]
    fn test_cell_update_addresses() {
        let update = CellUpdate::pnl(Column::Target1Result, 14, 12.345);
        assert_eq!(update.range, "K14");
        assert_eq!(update.value, "12.35");
        assert_eq!(CellUpdate::new(Column::OutcomeKind, 3, "Profit").range, "R3");
    }
}
