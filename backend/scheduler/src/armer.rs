//! One-shot timer arming with an explicit per-person handle map.
//!
//! The armer owns `person_id → task handle`; re-arming cancels the previous
//! timer for that person, so a person never has two live timers. Delays
//! beyond the millisecond-timer cap are not armed at all — the
//! reconciliation loop catches those occurrences on its periodic scan.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Largest delay a millisecond-resolution 32-bit timer can represent
/// (~24.8 days). Anything longer is left to the reconciliation loop.
pub const MAX_TIMER_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

pub struct TimerArmer {
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    fire_tx: mpsc::Sender<Uuid>,
}

impl TimerArmer {
    /// `fire_tx` receives the person id when an armed timer elapses.
    pub fn new(fire_tx: mpsc::Sender<Uuid>) -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
            fire_tx,
        }
    }

    /// Arm a one-shot wake-up for `person_id` at `fire_at`, replacing any
    /// previously armed timer for the same id.
    pub fn arm(&self, person_id: Uuid, fire_at: DateTime<Local>) {
        self.disarm(person_id);

        let delay = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
        if delay > MAX_TIMER_DELAY {
            debug!(
                person_id = %person_id,
                fire_at = %fire_at,
                "Delay exceeds timer cap, deferring to reconciliation"
            );
            return;
        }

        let tx = self.fire_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(person_id).await.is_err() {
                warn!(person_id = %person_id, "Fire channel closed, dropping timer event");
            }
        });
        self.timers.lock().unwrap().insert(person_id, handle);
        debug!(person_id = %person_id, fire_at = %fire_at, "Timer armed");
    }

    /// Cancel any armed timer for `person_id`. Safe when nothing is armed.
    pub fn disarm(&self, person_id: Uuid) {
        if let Some(handle) = self.timers.lock().unwrap().remove(&person_id) {
            handle.abort();
            debug!(person_id = %person_id, "Timer disarmed");
        }
    }

    pub fn disarm_all(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    pub fn armed_count(&self) -> usize {
        self.timers.lock().unwrap().len()
    }
}

impl Drop for TimerArmer {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
