//! Price-driven state machine for one trade
//!
//! Evaluation order per tick is fixed: stop, then target1, then target2.
//! `next_transition` is pure; the monitor applies each transition and asks
//! again with the same price until nothing more fires.

use std::fmt;

use crate::types::{CardKind, Column, CellUpdate, OutcomeKind, TradeRecord, STATUS_CLOSED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Watching,
    Target1Hit,
    Target2Hit,
    Closed,
}

impl MonitorState {
    /// State implied by the outcome fields already recorded on the trade
    pub fn of(trade: &TradeRecord) -> Self {
        if trade.closed {
            MonitorState::Closed
        } else if trade.target2_pnl.is_some() {
            MonitorState::Target2Hit
        } else if trade.target1_pnl.is_some() {
            MonitorState::Target1Hit
        } else {
            MonitorState::Watching
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorState::Closed)
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Watching => write!(f, "WATCHING"),
            MonitorState::Target1Hit => write!(f, "TARGET1_HIT"),
            MonitorState::Target2Hit => write!(f, "TARGET2_HIT"),
            MonitorState::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Stop before any target: full stop-loss close
    StopLoss { pnl: f64 },
    /// Stop after target1 was banked: close at the target1 PnL, no card
    SilentClose { pnl: f64 },
    /// Target1 reached; terminal when the trade has no target2
    Target1 { pnl: f64, terminal: bool },
    /// Target2 reached: terminal profit close
    Target2 { pnl: f64 },
}

pub fn next_transition(trade: &TradeRecord, price: f64) -> Option<Transition> {
    if trade.closed {
        return None;
    }

    if trade.stop_hit(price) {
        return Some(match trade.target1_pnl {
            Some(banked) => Transition::SilentClose { pnl: banked },
            None => Transition::StopLoss {
                pnl: trade.pnl_at(price),
            },
        });
    }

    if trade.target1_hit(price) {
        return Some(Transition::Target1 {
            pnl: trade.pnl_at(price),
            terminal: !trade.has_target2(),
        });
    }

    if trade.target2_hit(price) {
        return Some(Transition::Target2 {
            pnl: trade.pnl_at(price),
        });
    }

    None
}

/// Cells to write and card to send once a transition is applied
#[derive(Debug, Clone, PartialEq)]
pub struct Effects {
    pub updates: Vec<CellUpdate>,
    pub card: Option<CardKind>,
}

fn closing_cells(row: u32, final_pnl: f64, outcome: OutcomeKind) -> [CellUpdate; 3] {
    [
        CellUpdate::pnl(Column::FinalResult, row, final_pnl),
        CellUpdate::new(Column::Status, row, STATUS_CLOSED),
        CellUpdate::new(Column::OutcomeKind, row, outcome.sheet_label()),
    ]
}

/// Mutate `trade` for `transition` and return the resulting side effects
pub fn apply(trade: &mut TradeRecord, transition: Transition) -> Effects {
    let row = trade.row;
    let mut updates = Vec::new();

    let card = match transition {
        Transition::StopLoss { pnl } => {
            trade.close(pnl, OutcomeKind::StopLoss);
            updates.extend(closing_cells(row, pnl, OutcomeKind::StopLoss));
            Some(CardKind::Close)
        }
        Transition::SilentClose { pnl } => {
            trade.close(pnl, OutcomeKind::PartialProfit);
            updates.extend(closing_cells(row, pnl, OutcomeKind::PartialProfit));
            None
        }
        Transition::Target1 { pnl, terminal } => {
            if trade.record_target1(pnl) {
                updates.push(CellUpdate::pnl(Column::Target1Result, row, pnl));
            }
            if terminal {
                trade.close(pnl, OutcomeKind::Profit);
                updates.extend(closing_cells(row, pnl, OutcomeKind::Profit));
                Some(CardKind::Close)
            } else {
                Some(CardKind::Target1)
            }
        }
        Transition::Target2 { pnl } => {
            if trade.record_target2(pnl) {
                updates.push(CellUpdate::pnl(Column::Target2Result, row, pnl));
            }
            trade.close(pnl, OutcomeKind::Profit);
            updates.extend(closing_cells(row, pnl, OutcomeKind::Profit));
            Some(CardKind::Close)
        }
    };

    Effects { updates, card }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::make_trade;
    use crate::types::Side;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_quiet_prices_do_nothing() {
        let trade = make_trade(Side::Long, 100.0, 90.0, 110.0, None);
        assert_eq!(next_transition(&trade, 95.0), None);
        assert_eq!(next_transition(&trade, 105.0), None);
    }

    #[test]
    fn test_stop_before_target_is_stop_loss() {
        let mut trade = make_trade(Side::Long, 100.0, 90.0, 110.0, None);
        trade.leverage = 2.0;
        let t = next_transition(&trade, 89.0).unwrap();
        assert!(matches!(t, Transition::StopLoss { pnl } if approx(pnl, -22.0)));

        let effects = apply(&mut trade, t);
        assert_eq!(effects.card, Some(CardKind::Close));
        assert_eq!(trade.outcome, Some(OutcomeKind::StopLoss));
        let ranges: Vec<&str> = effects.updates.iter().map(|u| u.range.as_str()).collect();
        assert_eq!(ranges, vec!["P2", "Q2", "R2"]);
        assert_eq!(effects.updates[2].value, "Stop Loss");
        assert_eq!(MonitorState::of(&trade), MonitorState::Closed);
    }

    #[test]
    fn test_stop_after_target1_is_silent() {
        let mut trade = make_trade(Side::Long, 100.0, 90.0, 110.0, Some(130.0));
        trade.leverage = 1.0;
        let t1 = next_transition(&trade, 112.0).unwrap();
        assert!(matches!(t1, Transition::Target1 { pnl, terminal: false } if approx(pnl, 12.0)));
        apply(&mut trade, t1);
        assert_eq!(MonitorState::of(&trade), MonitorState::Target1Hit);

        let stop = next_transition(&trade, 89.0).unwrap();
        assert!(matches!(stop, Transition::SilentClose { .. }));
        let effects = apply(&mut trade, stop);
        assert_eq!(effects.card, None);
        assert_eq!(trade.final_pnl, trade.target1_pnl);
        assert_eq!(effects.updates[0].value, "12.00");
        assert_eq!(effects.updates[2].value, "Profit");
        assert_eq!(trade.outcome, Some(OutcomeKind::PartialProfit));
    }

    #[test]
    fn test_target1_without_target2_is_terminal() {
        let mut trade = make_trade(Side::Long, 100.0, 90.0, 110.0, None);
        let t = next_transition(&trade, 112.0).unwrap();
        assert!(matches!(t, Transition::Target1 { terminal: true, .. }));

        let effects = apply(&mut trade, t);
        let ranges: Vec<&str> = effects.updates.iter().map(|u| u.range.as_str()).collect();
        assert_eq!(ranges, vec!["K2", "P2", "Q2", "R2"]);
        assert_eq!(effects.card, Some(CardKind::Close));
        assert!(trade.closed);
        assert_eq!(next_transition(&trade, 200.0), None);
    }

    #[test]
    fn test_target2_requires_target1() {
        let mut trade = make_trade(Side::Short, 100.0, 105.0, 90.0, Some(80.0));
        // A gap through both levels fires target1 first
        let first = next_transition(&trade, 79.0).unwrap();
        assert!(matches!(first, Transition::Target1 { terminal: false, .. }));
        assert_eq!(apply(&mut trade, first).card, Some(CardKind::Target1));

        let second = next_transition(&trade, 79.0).unwrap();
        assert!(matches!(second, Transition::Target2 { pnl } if approx(pnl, 21.0)));
        let effects = apply(&mut trade, second);
        assert_eq!(effects.updates[0].range, "M2");
        assert_eq!(effects.updates[0].value, "21.00");
        assert_eq!(trade.outcome, Some(OutcomeKind::Profit));
        assert_eq!(next_transition(&trade, 79.0), None);
    }

    #[test]
    fn test_resumed_trade_starts_after_target1() {
        let mut trade = make_trade(Side::Long, 100.0, 90.0, 110.0, Some(120.0));
        trade.target1_pnl = Some(10.0);
        assert_eq!(MonitorState::of(&trade), MonitorState::Target1Hit);
        // target1 is not evaluated again
        assert_eq!(next_transition(&trade, 115.0), None);
    }
}
