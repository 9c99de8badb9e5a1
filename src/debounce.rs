//! Trailing-edge debounce on top of a [`Scheduler`].

use crate::scheduler::{Scheduler, TaskHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Action = Arc<dyn Fn() + Send + Sync>;

/// Collapses bursts of triggers into one call of `action`, `interval` after
/// the last trigger.
///
/// At most one task is armed at a time. Each [`trigger`](Self::trigger)
/// cancels the armed task (if it has not fired) and arms a fresh one.
pub struct Debouncer {
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    action: Action,
    pending: Mutex<Option<TaskHandle>>,
}

impl Debouncer {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        interval: Duration,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            scheduler,
            interval,
            action: Arc::new(action),
            pending: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Restart the quiet period.
    pub fn trigger(&self) {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.take() {
            handle.cancel();
        }

        let action = Arc::clone(&self.action);
        let handle = self
            .scheduler
            .schedule(self.interval, Box::new(move || action()));
        tracing::trace!(interval_ms = self.interval.as_millis() as u64, "debounce armed");
        *pending = Some(handle);
    }

    /// Drop the armed task, if any. Returns true if something was cancelled.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) => handle.cancel(),
            None => false,
        }
    }

    /// True while a trigger is waiting out its quiet period.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map_or(false, |handle| handle.is_armed())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
