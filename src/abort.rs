//! External teardown signal for subscriptions.
//!
//! An [`AbortController`] lets the owner of a data source (or any other
//! party) tear down subscriptions it did not create. Subscriptions holding
//! the matching [`AbortSignal`] cancel themselves when it fires.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type AbortCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Callbacks {
    next_id: u64,
    pending: Vec<(AbortRegistration, AbortCallback)>,
}

struct AbortInner {
    aborted: AtomicBool,
    callbacks: Mutex<Callbacks>,
}

/// Identifies one callback registered with [`AbortSignal::on_abort`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AbortRegistration(u64);

/// Owner side: fires the signal.
#[derive(Clone)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal {
                inner: Arc::new(AbortInner {
                    aborted: AtomicBool::new(false),
                    callbacks: Mutex::new(Callbacks::default()),
                }),
            },
        }
    }

    /// The signal handed to subscriptions.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fire the signal. Callbacks run once, on this thread; later calls are no-ops.
    pub fn abort(&self) {
        let inner = &self.signal.inner;
        if inner.aborted.swap(true, Ordering::SeqCst) {
            return;
        }

        let callbacks = std::mem::take(&mut inner.callbacks.lock().pending);
        for (_, callback) in callbacks {
            callback();
        }
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of an [`AbortController`].
#[derive(Clone)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Run `callback` when the signal fires, or right away if it already has.
    ///
    /// The returned registration can be passed to [`remove`](Self::remove)
    /// once the callback is no longer wanted.
    pub fn on_abort(&self, callback: impl FnOnce() + Send + 'static) -> AbortRegistration {
        let registration = {
            let mut callbacks = self.inner.callbacks.lock();
            callbacks.next_id += 1;
            let registration = AbortRegistration(callbacks.next_id);
            if !self.is_aborted() {
                callbacks.pending.push((registration, Box::new(callback)));
                return registration;
            }
            registration
        };
        callback();
        registration
    }

    /// Drop a callback that has not run yet. Returns false if it already ran
    /// or was removed.
    pub fn remove(&self, registration: AbortRegistration) -> bool {
        let mut callbacks = self.inner.callbacks.lock();
        let before = callbacks.pending.len();
        callbacks.pending.retain(|(id, _)| *id != registration);
        callbacks.pending.len() != before
    }

    /// Callbacks still waiting for the signal.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.lock().pending.len()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbortSignal(aborted: {})", self.is_aborted())
    }
}
