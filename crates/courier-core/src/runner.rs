//! Pass scheduling: at most one reconciliation pass at a time, triggers that
//! arrive mid-pass folded into a single follow-up pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::error::CourierError;
use crate::reconcile::{PassReport, Reconciler};
use crate::services::FeedSource;
use crate::store::Ledger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    /// The passes this trigger ran: its own plus any follow-up.
    Completed(Vec<PassReport>),
    /// Another pass was running; it will run one more pass when it finishes.
    Coalesced,
}

pub struct PassRunner {
    feed: Arc<dyn FeedSource>,
    reconciler: Reconciler,
    ledger: Mutex<Box<Ledger>>,
    pending: AtomicBool,
    shutdown: watch::Receiver<bool>,
}

impl PassRunner {
    /// `shutdown` flipping to `true` cancels the running pass between
    /// entries and ends [`PassRunner::run_forever`].
    pub fn new(
        feed: Arc<dyn FeedSource>,
        reconciler: Reconciler,
        ledger: Box<Ledger>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            feed,
            reconciler,
            ledger: Mutex::new(ledger),
            pending: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Runs a pass now, or queues one behind the pass already running.
    ///
    /// A failed follow-up pass is logged and the reports of the passes that
    /// did complete are returned.
    pub async fn trigger(&self) -> Result<TriggerResult, CourierError> {
        let mut reports = Vec::new();
        loop {
            // Raised before the lock attempt so a pass finishing in between
            // still sees it.
            if reports.is_empty() {
                self.pending.store(true, Ordering::SeqCst);
            }
            let Ok(mut ledger) = self.ledger.try_lock() else {
                return Ok(if reports.is_empty() {
                    TriggerResult::Coalesced
                } else {
                    TriggerResult::Completed(reports)
                });
            };
            self.pending.store(false, Ordering::SeqCst);

            let result = self.run_pass(&mut **ledger).await;
            drop(ledger);

            let report = match result {
                Ok(report) => report,
                Err(err) if !reports.is_empty() => {
                    error!(error = %err, "Follow-up pass failed");
                    return Ok(TriggerResult::Completed(reports));
                }
                Err(err) => return Err(err),
            };

            let cancelled = report.cancelled;
            reports.push(report);
            if cancelled || !self.pending.load(Ordering::SeqCst) {
                return Ok(TriggerResult::Completed(reports));
            }
            info!("Running follow-up pass for triggers received mid-pass");
        }
    }

    async fn run_pass(&self, ledger: &mut Ledger) -> Result<PassReport, CourierError> {
        let entries = self.feed.fetch().await?;
        info!(entries = entries.len(), "Starting reconciliation pass");
        Ok(self.reconciler.reconcile(entries, ledger, &self.shutdown).await)
    }

    /// Triggers a pass every `period` until shutdown is signalled.
    pub async fn run_forever(&self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.trigger().await {
                        error!(error = %err, "Reconciliation pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Runner stopped");
    }
}
