use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages exchanged with a background notification context.
///
/// `Schedule` and `Cancel` flow foreground → worker; `Confirm` flows back
/// when the user interacts with a fired alert. The channel is at-most-once
/// and unordered relative to foreground timer state — the reconciliation
/// loop stays the source of truth, these are hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Foreground → worker: arm an alert for this person.
    Schedule {
        id: Uuid,
        title: String,
        body: String,
        fire_at_ms: i64,
    },
    /// Foreground → worker: drop any pending alert for this person.
    Cancel { id: Uuid },
    /// Worker → foreground: the user acknowledged the alert; confirm the
    /// catch-up (cancel + reschedule).
    Confirm { id: Uuid },
}

impl WorkerMessage {
    /// Person id this message concerns.
    pub fn id(&self) -> Uuid {
        match self {
            WorkerMessage::Schedule { id, .. } => *id,
            WorkerMessage::Cancel { id } => *id,
            WorkerMessage::Confirm { id } => *id,
        }
    }
}
