pub mod kv;
pub mod people;
pub mod schedule;

pub use kv::{FileKv, KvStorage, MemoryKv};
pub use people::PersonStore;
pub use schedule::ScheduleStore;
