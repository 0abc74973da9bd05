//! Fires the user-visible alert for a due occurrence, behind the
//! notification-permission gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use catchup_core::{Notifier, PermissionGate, PermissionState, ScheduledOccurrence};

pub struct NotificationDispatcher {
    gate: Arc<dyn PermissionGate>,
    notifier: Arc<dyn Notifier>,
    unsupported_noticed: AtomicBool,
}

impl NotificationDispatcher {
    pub fn new(gate: Arc<dyn PermissionGate>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            gate,
            notifier,
            unsupported_noticed: AtomicBool::new(false),
        }
    }

    /// Attempt the visible alert for `occurrence`. Returns whether an alert
    /// was actually shown.
    ///
    /// Missing capability is surfaced once as informational; denied or
    /// undecided permission is a silent per-occurrence no-op. Either way the
    /// schedule still advances — the caller rolls the occurrence forward
    /// regardless of the return value.
    pub fn fire(&self, occurrence: &ScheduledOccurrence) -> bool {
        if !self.gate.supported() {
            if !self.unsupported_noticed.swap(true, Ordering::Relaxed) {
                info!("Notifications are not supported here; reminders will advance silently");
            }
            return false;
        }
        if self.gate.current() != PermissionState::Granted {
            debug!(
                person = %occurrence.person_name,
                "Notification permission not granted, skipping alert"
            );
            return false;
        }

        let title = occurrence.alert_title();
        let body = occurrence.alert_body();
        let tag = occurrence.person_id.to_string();
        if let Err(e) = self.notifier.notify(&title, &body, &tag) {
            warn!(person = %occurrence.person_name, error = %e, "Failed to show notification");
            return false;
        }
        true
    }
}

/// Notifier that writes alerts to the structured log. Always available;
/// also the delivery surface when no platform notifier is wired in.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str, tag: &str) -> anyhow::Result<()> {
        info!(tag, body, "{title}");
        Ok(())
    }
}

/// Permission gate with a fixed answer, configured at startup.
pub struct StaticGate {
    supported: bool,
    state: PermissionState,
}

impl StaticGate {
    pub fn granted() -> Self {
        Self {
            supported: true,
            state: PermissionState::Granted,
        }
    }

    pub fn denied() -> Self {
        Self {
            supported: true,
            state: PermissionState::Denied,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            state: PermissionState::Default,
        }
    }
}

impl PermissionGate for StaticGate {
    fn supported(&self) -> bool {
        self.supported
    }

    fn current(&self) -> PermissionState {
        self.state
    }

    fn request(&self) -> PermissionState {
        self.state
    }
}
