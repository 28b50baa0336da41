//! lifeseed-core - Core library for LifeSeed
//!
//! This crate contains the shared models, local store, and the
//! offline-first replication engine used by all LifeSeed interfaces.
//! Local CRUD always works; when connectivity and an authenticated
//! session are available, the sync engine keeps the device store and the
//! per-user remote document store eventually consistent.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Goal, Habit, Insight, JournalEntry, Mood, RecordKind};
pub use services::LocalStore;
pub use sync::{SyncEngine, SyncOutcome, SyncStatus};
