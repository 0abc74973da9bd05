pub mod armer;
pub mod dispatch;
pub mod reconcile;
pub mod recurrence;
pub mod scheduler;
pub mod worker;

pub use armer::TimerArmer;
pub use dispatch::{LogNotifier, NotificationDispatcher, StaticGate};
pub use reconcile::ReconciliationLoop;
pub use scheduler::CatchUpScheduler;
pub use worker::NotificationWorker;
