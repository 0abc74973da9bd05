//! Periodic backstop that catches occurrences missed by the timer path.
//!
//! Timers are lost to process restarts, suspension, and the delay cap; the
//! reconciliation loop scans the persisted schedule on a fixed cadence and
//! fires anything due. It also consumes hint messages from the background
//! notification context (user confirmations).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Local;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info};
use uuid::Uuid;

use catchup_core::{Component, WorkerMessage};

use crate::scheduler::CatchUpScheduler;

/// Default scan cadence.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

pub struct ReconciliationLoop {
    scheduler: Arc<CatchUpScheduler>,
    tick_interval: Duration,
    /// Timer-fire events from the armer; taken once when the loop starts.
    fire_rx: Mutex<Option<mpsc::Receiver<Uuid>>>,
}

impl ReconciliationLoop {
    pub fn new(scheduler: Arc<CatchUpScheduler>, fire_rx: mpsc::Receiver<Uuid>) -> Self {
        Self::with_tick(scheduler, fire_rx, DEFAULT_TICK)
    }

    pub fn with_tick(
        scheduler: Arc<CatchUpScheduler>,
        fire_rx: mpsc::Receiver<Uuid>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            tick_interval,
            fire_rx: Mutex::new(Some(fire_rx)),
        }
    }

    /// One reconciliation pass: fire everything due. Errors are logged per
    /// entry and never abort the scan; the fired latch inside `handle_fire`
    /// keeps overlapping passes from double-firing.
    pub fn tick(&self) {
        let now = Local::now();
        let mut fired = 0usize;
        for occurrence in self.scheduler.occurrences() {
            if occurrence.is_due(now) {
                match self.scheduler.handle_fire(occurrence.person_id) {
                    Ok(()) => fired += 1,
                    Err(e) => {
                        error!(
                            person = %occurrence.person_name,
                            error = %e,
                            "Reconciliation fire failed"
                        );
                    }
                }
            } else if occurrence.fired && occurrence.fire_at_ms <= now.timestamp_millis() {
                // A fired record still sitting in the past means the write
                // for its successor never landed. Retry without re-alerting.
                if let Err(e) = self.scheduler.roll_forward(occurrence.person_id) {
                    error!(
                        person = %occurrence.person_name,
                        error = %e,
                        "Reconciliation roll-forward failed"
                    );
                }
            }
        }
        if fired > 0 {
            debug!(fired, "Reconciliation tick fired overdue occurrences");
        }
    }

    fn handle_message(&self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Confirm { id } => {
                if let Err(e) = self.scheduler.confirm_catch_up(id) {
                    error!(person_id = %id, error = %e, "Failed to confirm catch-up");
                }
            }
            other => {
                debug!(msg = ?other, "Reconciliation ignoring non-confirm message");
            }
        }
    }
}

#[async_trait]
impl Component for ReconciliationLoop {
    fn name(&self) -> &str {
        "reconciliation"
    }

    async fn start(&self, mut rx: mpsc::Receiver<WorkerMessage>) -> Result<()> {
        let mut fire_rx = self
            .fire_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("reconciliation loop already started"))?;

        info!(
            tick_secs = self.tick_interval.as_secs(),
            "Reconciliation loop started"
        );

        // The first interval tick completes immediately, giving the
        // startup scan that catches anything missed while unloaded.
        let mut ticker = time::interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                fired = fire_rx.recv() => {
                    match fired {
                        Some(person_id) => {
                            if let Err(e) = self.scheduler.handle_fire(person_id) {
                                error!(person_id = %person_id, error = %e, "Timer fire failed");
                            }
                        }
                        None => {
                            info!("Fire channel closed, shutting down reconciliation");
                            break;
                        }
                    }
                }
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg),
                        None => {
                            info!("Message channel closed, shutting down reconciliation");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
