//! Replication: connectivity tracking, status broadcasting, scheduling,
//! and the sync engine itself.

mod connectivity;
mod engine;
mod scheduler;
mod status;


pub use connectivity::{ConnectivityMonitor, Transition};
pub use engine::{SyncEngine, SyncOutcome};
pub use scheduler::{ScheduleHandle, Scheduler, TokioScheduler};
pub use status::{StatusPublisher, SyncStatus};
