//! Pluggable recurring scheduler.
//!
//! The engine's periodic sync is testable without a platform background
//! task facility: anything that can call the tick closure on a cadence
//! can drive it.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

/// Schedules a recurring tick.
pub trait Scheduler: Send + Sync {
    /// Invoke `tick` every `interval` until the returned handle is
    /// cancelled or dropped. The first tick fires after one full
    /// interval, not immediately.
    fn schedule_recurring(
        &self,
        interval: Duration,
        tick: Box<dyn Fn() + Send + Sync>,
    ) -> ScheduleHandle;
}

/// Cancels its schedule when dropped.
pub struct ScheduleHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduleHandle {
    /// Build a handle around a cancellation action.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to cancel (manual schedulers).
    #[must_use]
    pub const fn noop() -> Self {
        Self { cancel: None }
    }

    /// Stop the schedule now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Tokio-backed scheduler driving a spawned interval task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_recurring(
        &self,
        interval: Duration,
        tick: Box<dyn Fn() + Send + Sync>,
    ) -> ScheduleHandle {
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval's first tick completes immediately; swallow it so
            // the first real tick lands one interval from now
            timer.tick().await;
            loop {
                timer.tick().await;
                tick();
            }
        });

        ScheduleHandle::new(move || task.abort())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn tokio_scheduler_ticks_repeatedly() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&ticks);

        let scheduler = TokioScheduler;
        let handle = scheduler.schedule_recurring(
            Duration::from_millis(10),
            Box::new(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected repeated ticks, saw {seen}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropping_the_handle_stops_ticking() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&ticks);

        let scheduler = TokioScheduler;
        let handle = scheduler.schedule_recurring(
            Duration::from_millis(10),
            Box::new(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            }),
        );
        drop(handle);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
