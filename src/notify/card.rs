//! Trade card rendering (Telegram HTML caption)

use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::types::{CardKind, OutcomeKind, TradeRecord};

/// Escape the characters Telegram's HTML parse mode treats as markup
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn drive_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[-\w]{25,}").ok())
        .as_ref()
}

/// Turn a Google Drive share link into a direct download link
pub fn direct_image_url(reference: &str) -> String {
    let reference = reference.trim();
    if !reference.contains("drive.google.com") && !reference.contains("docs.google.com") {
        return reference.to_string();
    }
    match drive_id_pattern().and_then(|p| p.find(reference)) {
        Some(id) => format!(
            "https://drive.google.com/uc?export=download&id={}",
            id.as_str()
        ),
        None => reference.to_string(),
    }
}

fn header(trade: &TradeRecord, kind: CardKind) -> String {
    match kind {
        CardKind::Open => "🚨 Novo Trade Detectado!".to_string(),
        CardKind::Target1 => format!(
            "🚨 Alvo 1 atingido! ({:.2}%)",
            trade.target1_pnl.unwrap_or_default()
        ),
        CardKind::Close => {
            let final_pnl = trade.final_pnl.unwrap_or_default();
            match (trade.outcome, trade.target2_pnl) {
                (Some(OutcomeKind::StopLoss), _) => {
                    format!("🚨 Stop Loss atingido! ({:.2}%)", final_pnl)
                }
                (_, Some(t2)) => format!("🚨 Alvo 2 atingido! ({:.2}%)", t2),
                _ => format!("🚨 Alvo 1 atingido! ({:.2}%)", final_pnl),
            }
        }
    }
}

pub fn render_caption(trade: &TradeRecord, kind: CardKind) -> String {
    let mut caption = header(trade, kind);
    let _ = write!(
        caption,
        "\nAtivo: {}\nCategoria: {}\nPosição: {} | Alavancagem: {}x\n🎯 Entrada: {} | Stop: {}\nAlvo: {}",
        escape_html(&trade.asset),
        escape_html(&trade.category),
        trade.side,
        trade.leverage,
        trade.entry,
        trade.stop,
        trade.target1,
    );
    if let Some(t2) = trade.target2 {
        let _ = write!(caption, " | Alvo 2: {}", t2);
    }
    let _ = write!(
        caption,
        "\nTrader: {}\nData: {}\n\nAnálise: {}",
        escape_html(&trade.trader),
        escape_html(&trade.timestamp),
        escape_html(&trade.analysis),
    );
    caption
}
