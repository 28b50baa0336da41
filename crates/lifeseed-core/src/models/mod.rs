//! Data models for LifeSeed

mod goal;
mod habit;
mod insight;
mod journal;
mod mood;
mod record;

pub use goal::Goal;
pub use habit::Habit;
pub use insight::Insight;
pub use journal::JournalEntry;
pub use mood::Mood;
pub use record::{merge_fields, Fields, Payload, Record, RecordKind, StoredRecord};
