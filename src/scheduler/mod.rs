//! Cancellable delayed tasks.
//!
//! Every delayed piece of work (today: debounced re-evaluations) goes through
//! a [`Scheduler`], which hands back a [`TaskHandle`]. A handle moves from
//! `Armed` to either `Fired` or `Cancelled`, exactly once:
//!
//! ```text
//!          fire()           cancel()
//! Fired <--------- Armed ----------> Cancelled
//! ```
//!
//! Both transitions are compare-and-swap, so a task never runs after a
//! successful cancel and never runs twice.
//!
//! Two schedulers are provided:
//! - [`TimerScheduler`]: one worker thread with a deadline heap
//! - [`ManualScheduler`]: a virtual clock driven by [`ManualScheduler::advance`]

mod manual;
mod timer;

pub use manual::ManualScheduler;
pub use timer::TimerScheduler;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Work to run once a delay has elapsed.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a task after a delay.
pub trait Scheduler: Send + Sync {
    /// Arm `task` to run after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;
}

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Lifecycle of a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Armed,
    Fired,
    Cancelled,
}

/// Shared handle to a scheduled task.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<AtomicU8>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ARMED)),
        }
    }

    /// A handle that will never fire.
    pub fn cancelled() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CANCELLED)),
        }
    }

    /// Cancel the task. Returns true if it had not fired yet.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(ARMED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::SeqCst) {
            ARMED => TaskState::Armed,
            FIRED => TaskState::Fired,
            _ => TaskState::Cancelled,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state() == TaskState::Armed
    }

    fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(ARMED, FIRED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({:?})", self.state())
    }
}

/// A task paired with its handle, as stored by scheduler implementations.
pub(crate) struct ScheduledTask {
    handle: TaskHandle,
    task: Task,
}

impl ScheduledTask {
    pub(crate) fn new(task: Task) -> (Self, TaskHandle) {
        let handle = TaskHandle::new();
        (
            Self {
                handle: handle.clone(),
                task,
            },
            handle,
        )
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.handle.state() == TaskState::Cancelled
    }

    /// Run the task unless it was cancelled first. Returns whether it ran.
    pub(crate) fn run(self) -> bool {
        if self.handle.try_fire() {
            (self.task)();
            true
        } else {
            false
        }
    }
}
