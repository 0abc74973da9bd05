pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use error::CatchUpError;
pub use message::WorkerMessage;
pub use traits::{Component, Notifier, PermissionGate};
pub use types::{
    ContactMethod, Frequency, PermissionState, Person, ScheduledOccurrence, TimeSelection,
    TimeWindow,
};
