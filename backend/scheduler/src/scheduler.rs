//! Orchestrates the per-person compute → persist → arm cycle.
//!
//! Every occurrence follows the same chain: a person is added or edited, the
//! calculator produces the next fire time, the store persists it, the armer
//! wakes us up, dispatch fires the alert and the chain computes the
//! following occurrence. All schedule mutations for a person funnel through
//! this type, keeping the single-writer discipline of the store intact.

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use catchup_core::{Person, ScheduledOccurrence, WorkerMessage};
use catchup_store::{PersonStore, ScheduleStore};

use crate::armer::TimerArmer;
use crate::dispatch::NotificationDispatcher;
use crate::recurrence;

pub struct CatchUpScheduler {
    people: Arc<PersonStore>,
    schedule: Arc<ScheduleStore>,
    armer: TimerArmer,
    dispatcher: NotificationDispatcher,
    /// Optional hint channel to a background notification context.
    worker_tx: Option<mpsc::Sender<WorkerMessage>>,
}

impl CatchUpScheduler {
    pub fn new(
        people: Arc<PersonStore>,
        schedule: Arc<ScheduleStore>,
        armer: TimerArmer,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            people,
            schedule,
            armer,
            dispatcher,
            worker_tx: None,
        }
    }

    /// Delegate alert arming to a background context in addition to the
    /// in-process timers. Best-effort: the reconciliation loop remains the
    /// source of truth.
    pub fn with_worker(mut self, worker_tx: mpsc::Sender<WorkerMessage>) -> Self {
        self.worker_tx = Some(worker_tx);
        self
    }

    /// Add or edit a person, then compute → persist → arm their next
    /// occurrence.
    pub fn upsert_person(&self, person: Person) -> Result<ScheduledOccurrence> {
        self.people.upsert(person.clone())?;
        self.schedule_person(&person)
    }

    /// Remove a person entirely: person list, schedule entry, and any
    /// pending timer.
    pub fn remove_person(&self, person_id: Uuid) -> Result<bool> {
        let removed = self.people.remove(person_id)?;
        self.cancel_reminder(person_id)?;
        Ok(removed)
    }

    /// Compute the next occurrence for `person` and replace whatever was
    /// scheduled before.
    pub fn schedule_person(&self, person: &Person) -> Result<ScheduledOccurrence> {
        let existing = self.schedule.all();
        let mut rng = rand::rng();
        let fire_at = recurrence::compute_next(person, Local::now(), &existing, &mut rng);
        let occurrence = ScheduledOccurrence::new(person, fire_at);

        self.schedule.put(occurrence.clone())?;
        self.armer.arm(person.id, fire_at);
        self.send_worker(WorkerMessage::Schedule {
            id: person.id,
            title: occurrence.alert_title(),
            body: occurrence.alert_body(),
            fire_at_ms: occurrence.fire_at_ms,
        });
        info!(
            person = %person.name,
            fire_at = %fire_at,
            "Scheduled next catch-up"
        );
        Ok(occurrence)
    }

    /// Re-establish timers after a restart: keep persisted unfired
    /// occurrences, compute fresh ones for people without an entry.
    pub fn rearm_all(&self) {
        for person in self.people.all() {
            match self.schedule.get(person.id) {
                Some(occ) if !occ.fired => {
                    self.armer.arm(person.id, occ.fire_at());
                    self.send_worker(WorkerMessage::Schedule {
                        id: person.id,
                        title: occ.alert_title(),
                        body: occ.alert_body(),
                        fire_at_ms: occ.fire_at_ms,
                    });
                }
                _ => {
                    if let Err(e) = self.schedule_person(&person) {
                        error!(person = %person.name, error = %e, "Failed to schedule on startup");
                    }
                }
            }
        }
    }

    /// Drop the schedule entry and disarm the timer for a person. The two
    /// operations are issued together; safe when nothing is scheduled.
    pub fn cancel_reminder(&self, person_id: Uuid) -> Result<()> {
        self.schedule.remove(person_id)?;
        self.armer.disarm(person_id);
        self.send_worker(WorkerMessage::Cancel { id: person_id });
        Ok(())
    }

    /// Explicit user confirmation of a catch-up: cancel the current
    /// reminder and reschedule from now.
    pub fn confirm_catch_up(&self, person_id: Uuid) -> Result<Option<ScheduledOccurrence>> {
        self.cancel_reminder(person_id)?;
        match self.people.get(person_id) {
            Some(person) => {
                info!(person = %person.name, "Catch-up confirmed, rescheduling");
                Ok(Some(self.schedule_person(&person)?))
            }
            None => {
                warn!(person_id = %person_id, "Confirmation for unknown person");
                Ok(None)
            }
        }
    }

    /// Fire path shared by armed timers and the reconciliation scan.
    ///
    /// The `mark_fired` latch makes this re-entrant safe: whichever path
    /// gets there first dispatches, everyone else sees a no-op. A fire
    /// always rolls the person forward to their next occurrence.
    pub fn handle_fire(&self, person_id: Uuid) -> Result<()> {
        let Some(occurrence) = self.schedule.get(person_id) else {
            self.armer.disarm(person_id);
            return Ok(());
        };
        if !occurrence.is_due(Local::now()) {
            debug!(person_id = %person_id, "Stale fire event for a rescheduled occurrence");
            return Ok(());
        }
        if !self.schedule.mark_fired(person_id)? {
            debug!(person_id = %person_id, "Occurrence already fired, skipping");
            return Ok(());
        }

        self.dispatcher.fire(&occurrence);
        self.send_worker(WorkerMessage::Cancel { id: person_id });
        self.roll_forward(person_id)
    }

    /// Replace a fired record with the person's next occurrence, or drop it
    /// when the person is gone. Also the retry path when the write for the
    /// successor failed after dispatch: the reconciliation scan calls this
    /// for any fired record left sitting in the past.
    pub fn roll_forward(&self, person_id: Uuid) -> Result<()> {
        match self.people.get(person_id) {
            Some(person) => {
                // Overwrites the just-fired record with the next occurrence.
                self.schedule_person(&person)?;
            }
            None => {
                self.schedule.remove(person_id)?;
                self.armer.disarm(person_id);
            }
        }
        Ok(())
    }

    /// Read-only snapshot of unfired occurrences, soonest first.
    pub fn upcoming(&self, limit: usize) -> Vec<ScheduledOccurrence> {
        let mut all: Vec<_> = self
            .schedule
            .all()
            .into_iter()
            .filter(|occ| !occ.fired)
            .collect();
        all.sort_by_key(|occ| occ.fire_at_ms);
        all.truncate(limit);
        all
    }

    pub fn occurrences(&self) -> Vec<ScheduledOccurrence> {
        self.schedule.all()
    }

    pub fn people(&self) -> &PersonStore {
        &self.people
    }

    #[cfg(test)]
    pub(crate) fn schedule_store(&self) -> &Arc<ScheduleStore> {
        &self.schedule
    }

    fn send_worker(&self, msg: WorkerMessage) {
        if let Some(tx) = &self.worker_tx {
            if let Err(e) = tx.try_send(msg) {
                debug!(error = %e, "Worker hint channel full or closed, dropping message");
            }
        }
    }
}
