//! Observable sync status.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Snapshot of the replication state, broadcast on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Last known connectivity; `false` until a signal arrives.
    pub is_online: bool,
    /// Wall-clock time of the last pass in which at least one collection
    /// committed, `None` if no pass ever succeeded.
    pub last_sync: Option<DateTime<Utc>>,
    /// Records with unpushed local changes across all collections.
    pub pending_sync_count: i64,
    /// Whether a sync pass is currently in flight.
    pub is_syncing: bool,
}

/// Holds the canonical [`SyncStatus`] and notifies subscribers
/// synchronously whenever a field actually changes.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<SyncStatus>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::default());
        Self { tx }
    }

    /// Subscribe to status changes. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub fn set_online(&self, is_online: bool) {
        self.update(|status| {
            let changed = status.is_online != is_online;
            status.is_online = is_online;
            changed
        });
    }

    pub fn set_syncing(&self, is_syncing: bool) {
        self.update(|status| {
            let changed = status.is_syncing != is_syncing;
            status.is_syncing = is_syncing;
            changed
        });
    }

    pub fn set_pending(&self, pending: i64) {
        self.update(|status| {
            let changed = status.pending_sync_count != pending;
            status.pending_sync_count = pending;
            changed
        });
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) {
        self.update(|status| {
            let changed = status.last_sync != Some(at);
            status.last_sync = Some(at);
            changed
        });
    }

    fn update(&self, mutate: impl FnOnce(&mut SyncStatus) -> bool) {
        self.tx.send_if_modified(mutate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util;

    #[test]
    fn default_snapshot_is_offline_and_idle() {
        let publisher = StatusPublisher::new();
        let status = publisher.snapshot();
        assert!(!status.is_online);
        assert!(!status.is_syncing);
        assert_eq!(status.pending_sync_count, 0);
        assert_eq!(status.last_sync, None);
    }

    #[test]
    fn subscribers_observe_changes() {
        let publisher = StatusPublisher::new();
        let mut rx = publisher.subscribe();
        assert!(!rx.has_changed().unwrap());

        publisher.set_pending(3);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().pending_sync_count, 3);

        // Writing the same value again must not wake subscribers
        publisher.set_pending(3);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn last_sync_is_sticky() {
        let publisher = StatusPublisher::new();
        let at = util::now_ms();
        publisher.set_last_sync(at);
        publisher.set_online(true);
        assert_eq!(publisher.snapshot().last_sync, Some(at));
    }
}
