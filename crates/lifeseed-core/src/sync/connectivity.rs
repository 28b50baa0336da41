//! Connectivity state tracking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::StatusPublisher;

/// Edge emitted when the connectivity state actually changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
}

/// Maintains a boolean online/offline state from pushed platform signals.
///
/// Events are edge-triggered: repeated identical signals emit nothing, so
/// flapping connectivity cannot trigger a sync storm. Until the first
/// signal arrives the state is offline, which keeps the engine from
/// attempting network calls blindly.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    status: Arc<StatusPublisher>,
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new(status: Arc<StatusPublisher>) -> Self {
        Self {
            online: AtomicBool::new(false),
            status,
        }
    }

    /// Feed a raw connectivity signal; returns the transition, if any.
    pub fn report(&self, connected: bool) -> Option<Transition> {
        let was_online = self.online.swap(connected, Ordering::SeqCst);
        self.status.set_online(connected);

        match (was_online, connected) {
            (false, true) => Some(Transition::CameOnline),
            (true, false) => Some(Transition::WentOffline),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
