//! Bounded-concurrency monitor scheduler
//!
//! Admission is keyed by trade id: a trade already tracked (queued or
//! running) is never admitted twice. A semaphore caps how many monitors run
//! at once; admitted trades over the ceiling wait for a permit without
//! holding one. Slot release is tied to an RAII guard so it happens exactly
//! once whether the monitor returns, panics or is aborted.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::monitor::MonitorExit;
use crate::types::{TradeId, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    /// Already queued or running
    AlreadyActive,
    /// A monitor already ran this trade to a close
    AlreadyClosed,
    ShuttingDown,
}

struct Admissions {
    active: HashMap<TradeId, AbortHandle>,
    closed: HashSet<TradeId>,
    /// Publishes `active.len()` after every change
    active_len: watch::Sender<usize>,
}

impl Admissions {
    fn publish(&self) {
        self.active_len.send_replace(self.active.len());
    }
}

pub struct MonitorScheduler {
    permits: Arc<Semaphore>,
    limit: usize,
    admissions: Arc<Mutex<Admissions>>,
    accepting: AtomicBool,
}

/// Removes the admission entry when the monitor task ends
struct AdmissionGuard {
    admissions: Arc<Mutex<Admissions>>,
    id: TradeId,
    closed: bool,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        let mut admissions = lock(&self.admissions);
        admissions.active.remove(&self.id);
        if self.closed {
            admissions.closed.insert(self.id.clone());
        }
        admissions.publish();
    }
}

fn lock(admissions: &Mutex<Admissions>) -> MutexGuard<'_, Admissions> {
    // The map stays consistent even if a holder panicked
    admissions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MonitorScheduler {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            admissions: Arc::new(Mutex::new(Admissions {
                active: HashMap::new(),
                closed: HashSet::new(),
                active_len: watch::channel(0).0,
            })),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Trades admitted and not yet finished, queued ones included
    pub fn active_count(&self) -> usize {
        lock(&self.admissions).active.len()
    }

    /// Monitors currently holding a slot
    pub fn running_count(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    pub fn is_tracked(&self, id: &TradeId) -> bool {
        let admissions = lock(&self.admissions);
        admissions.active.contains_key(id) || admissions.closed.contains(id)
    }

    /// Admit `trade` and spawn `run` once a slot is free
    pub fn admit<F, Fut>(&self, trade: TradeRecord, run: F) -> AdmitOutcome
    where
        F: FnOnce(TradeRecord) -> Fut + Send + 'static,
        Fut: Future<Output = MonitorExit> + Send + 'static,
    {
        if !self.accepting.load(Ordering::SeqCst) {
            return AdmitOutcome::ShuttingDown;
        }

        let id = trade.id.clone();
        let mut admissions = lock(&self.admissions);
        if admissions.closed.contains(&id) {
            return AdmitOutcome::AlreadyClosed;
        }
        if admissions.active.contains_key(&id) {
            return AdmitOutcome::AlreadyActive;
        }

        let mut guard = AdmissionGuard {
            admissions: self.admissions.clone(),
            id: id.clone(),
            closed: false,
        };
        let permits = self.permits.clone();

        // The lock is held until the handle is stored, so the guard's drop
        // can only remove the entry after it exists.
        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(trade_id = %guard.id, "Scheduler closed before monitor started");
                    return;
                }
            };
            debug!(trade_id = %guard.id, "Monitor slot acquired");

            match run(trade).await {
                MonitorExit::Closed(outcome) => {
                    guard.closed = true;
                    debug!(trade_id = %guard.id, outcome = %outcome, "Monitor finished");
                }
                MonitorExit::Aborted { failures } => {
                    warn!(trade_id = %guard.id, failures, "Monitor aborted, trade left open");
                }
            }
        });
        admissions.active.insert(id, handle.abort_handle());
        admissions.publish();

        AdmitOutcome::Admitted
    }

    /// Wait until every admitted monitor has finished
    pub async fn join_all(&self) {
        let mut active_len = lock(&self.admissions).active_len.subscribe();
        // Err only if the sender is gone, which needs `self` dropped
        let _ = active_len.wait_for(|len| *len == 0).await;
    }

    /// Stop admitting, give running monitors `grace` to finish, abort the rest
    pub async fn shutdown(&self, grace: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        self.permits.close();

        let aborts: Vec<_> = lock(&self.admissions)
            .active
            .values()
            .cloned()
            .collect();
        info!(monitors = aborts.len(), grace_secs = grace.as_secs(), "🛑 Stopping monitors");

        if tokio::time::timeout(grace, self.join_all()).await.is_err() {
            warn!("Grace period elapsed, aborting remaining monitors");
            for abort in &aborts {
                abort.abort();
            }
            // Aborted tasks drop their guards on cancellation
            self.join_all().await;
        }
        info!("All monitors stopped");
    }
}
