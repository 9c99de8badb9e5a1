//! One-shot readiness signal.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type ReadyCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ReadyState {
    ready: bool,
    callbacks: Vec<ReadyCallback>,
}

#[derive(Default)]
struct ReadyInner {
    state: Mutex<ReadyState>,
    cond: Condvar,
}

/// Resolves once, when the host database finishes initializing.
///
/// Clones share the same underlying signal.
#[derive(Clone, Default)]
pub struct ReadySignal {
    inner: Arc<ReadyInner>,
}

impl ReadySignal {
    /// A signal that has not resolved yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that is already resolved.
    pub fn resolved() -> Self {
        let signal = Self::new();
        signal.mark_ready();
        signal
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    /// Resolve the signal, waking waiters and running queued callbacks on
    /// this thread. Later calls are no-ops.
    pub fn mark_ready(&self) {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.ready {
                return;
            }
            state.ready = true;
            std::mem::take(&mut state.callbacks)
        };

        self.inner.cond.notify_all();
        tracing::debug!(callbacks = callbacks.len(), "data source ready");

        for callback in callbacks {
            callback();
        }
    }

    /// Run `callback` once the signal resolves (immediately if it has).
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.inner.state.lock();
            if !state.ready {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Block until ready.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock();
        while !state.ready {
            self.inner.cond.wait(&mut state);
        }
    }

    /// Block until ready or until `timeout` passes. Returns readiness.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.inner.state.lock();
        if !state.ready {
            self.inner
                .cond
                .wait_while_for(&mut state, |s| !s.ready, timeout);
        }
        state.ready
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReadySignal(ready: {})", self.is_ready())
    }
}
