//! Delivery ledger - which cards were already sent
//!
//! Ordered, size-capped and persisted as a JSON array so a restart does not
//! resend cards. Open cards are stored as the bare trade id (the historical
//! format of the file); other kinds as `<kind>|<trade id>`.

use anyhow::{Context, Result};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::{CardKind, TradeId};

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct DeliveryLedger {
    path: Option<PathBuf>,
    capacity: usize,
    entries: VecDeque<String>,
    index: HashSet<String>,
}

fn entry_key(id: &TradeId, kind: CardKind) -> String {
    match kind {
        CardKind::Open => id.to_string(),
        other => format!("{}|{}", other, id),
    }
}

impl DeliveryLedger {
    /// Ledger that is never written to disk
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            path: None,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    /// Load from `path`. Missing or corrupt files give an empty ledger.
    pub fn load(path: impl AsRef<Path>, capacity: usize) -> Self {
        let path = path.as_ref();
        let mut ledger = Self::in_memory(capacity);
        ledger.path = Some(path.to_path_buf());

        if !path.exists() {
            info!(path = %path.display(), "No delivery ledger yet, starting empty");
            return ledger;
        }

        let stored: Vec<String> = match fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|json| serde_json::from_str(&json).map_err(anyhow::Error::from))
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Delivery ledger unreadable, starting empty");
                return ledger;
            }
        };

        for key in stored {
            ledger.push_key(key);
        }
        info!(path = %path.display(), entries = ledger.len(), "📂 Delivery ledger loaded");
        ledger
    }

    pub fn contains(&self, id: &TradeId, kind: CardKind) -> bool {
        self.index.contains(&entry_key(id, kind))
    }

    /// Append an entry, evicting the oldest beyond capacity.
    /// Returns false when it was already present.
    pub fn record(&mut self, id: &TradeId, kind: CardKind) -> bool {
        self.push_key(entry_key(id, kind))
    }

    fn push_key(&mut self, key: String) -> bool {
        if !self.index.insert(key.clone()) {
            return false;
        }
        self.entries.push_back(key);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.index.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the ledger (temp file + rename). No-op for in-memory ledgers.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}
