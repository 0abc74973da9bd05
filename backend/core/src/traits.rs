use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::WorkerMessage;
use crate::types::PermissionState;

/// Trait for long-running engine components (reconciliation loop,
/// notification worker).
///
/// Each component consumes messages from its channel and runs in its own
/// Tokio task.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Human-readable name of this component.
    fn name(&self) -> &str;

    /// Start the component's event loop, consuming from the given receiver.
    async fn start(&self, rx: mpsc::Receiver<WorkerMessage>) -> Result<()>;
}

/// Notification-permission capability, consumed but never requested by the
/// scheduling core.
pub trait PermissionGate: Send + Sync {
    /// Whether the runtime supports user-visible notifications at all.
    fn supported(&self) -> bool;

    /// Current permission state without prompting.
    fn current(&self) -> PermissionState;

    /// Prompt the user. Only outer UI layers call this.
    fn request(&self) -> PermissionState;
}

/// The user-visible alert surface.
pub trait Notifier: Send + Sync {
    /// Show an alert. `tag` identifies the person so repeated alerts for the
    /// same person replace rather than stack.
    fn notify(&self, title: &str, body: &str, tag: &str) -> Result<()>;
}
