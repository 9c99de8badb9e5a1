//! Virtual-clock scheduler for deterministic tests and host-driven loops.

use super::{ScheduledTask, Scheduler, Task, TaskHandle};
use parking_lot::Mutex;
use std::time::Duration;

struct Pending {
    deadline: Duration,
    seq: u64,
    task: ScheduledTask,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// A scheduler whose clock only moves when told to.
///
/// Tasks run on the thread calling [`advance`](Self::advance), in deadline
/// order. A task may schedule further tasks; those run in the same
/// `advance` call if they fall inside the window.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of tasks still armed.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .pending
            .iter()
            .filter(|p| !p.task.is_cancelled())
            .count()
    }

    /// Move the clock forward by `by`, running every task that falls due.
    /// Returns how many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut ran = 0;

        loop {
            let next = {
                let mut state = self.state.lock();
                state.pending.retain(|p| !p.task.is_cancelled());

                let due = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.deadline <= target)
                    .min_by_key(|(_, p)| (p.deadline, p.seq))
                    .map(|(i, _)| i);

                match due {
                    Some(i) => {
                        let entry = state.pending.swap_remove(i);
                        state.now = state.now.max(entry.deadline);
                        Some(entry.task)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            match next {
                // Run without holding the clock lock.
                Some(task) => {
                    if task.run() {
                        ran += 1;
                    }
                }
                None => break,
            }
        }

        ran
    }

    /// Run everything currently scheduled, however far out.
    pub fn run_until_idle(&self) -> usize {
        let furthest = {
            let state = self.state.lock();
            state
                .pending
                .iter()
                .map(|p| p.deadline)
                .max()
                .map(|d| d.saturating_sub(state.now))
        };

        match furthest {
            Some(by) => self.advance(by),
            None => 0,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let (task, handle) = ScheduledTask::new(task);

        let mut state = self.state.lock();
        let deadline = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(Pending {
            deadline,
            seq,
            task,
        });

        handle
    }
}
