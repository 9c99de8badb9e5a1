//! Worker-thread scheduler backed by a deadline heap.

use super::{ScheduledTask, Scheduler, Task, TaskHandle};
use crate::error::Result;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

enum Command {
    Schedule { deadline: Instant, task: ScheduledTask },
    Shutdown,
}

/// Heap entry ordered so the earliest deadline pops first; ties keep
/// submission order.
struct Entry {
    deadline: Instant,
    seq: u64,
    task: ScheduledTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Runs scheduled tasks on a single background thread.
///
/// All tasks share the thread, so tasks from different subscriptions never
/// run in parallel with each other.
pub struct TimerScheduler {
    sender: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl TimerScheduler {
    /// Spawn the worker thread. Fails with
    /// [`QueryError::Io`](crate::QueryError::Io) if the OS refuses the thread.
    pub fn new() -> Result<Self> {
        let (sender, receiver) = unbounded::<Command>();

        let worker = thread::Builder::new()
            .name("livequery-timer".to_string())
            .spawn(move || {
                let mut heap: BinaryHeap<Entry> = BinaryHeap::new();
                let mut seq = 0u64;

                loop {
                    let command = match heap.peek() {
                        Some(next) => {
                            let timeout = next.deadline.saturating_duration_since(Instant::now());
                            match receiver.recv_timeout(timeout) {
                                Ok(command) => Some(command),
                                Err(RecvTimeoutError::Timeout) => None,
                                Err(RecvTimeoutError::Disconnected) => break,
                            }
                        }
                        None => match receiver.recv() {
                            Ok(command) => Some(command),
                            Err(_) => break,
                        },
                    };

                    match command {
                        Some(Command::Schedule { deadline, task }) => {
                            seq += 1;
                            heap.push(Entry { deadline, seq, task });
                        }
                        Some(Command::Shutdown) => break,
                        None => {}
                    }

                    let now = Instant::now();
                    while heap.peek().map_or(false, |e| e.deadline <= now) {
                        if let Some(entry) = heap.pop() {
                            entry.task.run();
                        }
                    }
                    heap.retain(|e| !e.task.is_cancelled());
                }

                tracing::trace!(pending = heap.len(), "timer worker stopped");
            })?;

        let worker_id = worker.thread().id();
        tracing::debug!("timer worker started");

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    /// Stop the worker. Pending tasks are dropped without running.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            // A task dropping the last reference must not join its own thread.
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}

impl Scheduler for TimerScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let (task, handle) = ScheduledTask::new(task);
        let deadline = Instant::now() + delay;

        if self.sender.send(Command::Schedule { deadline, task }).is_err() {
            tracing::warn!("timer worker has stopped; task dropped");
            handle.cancel();
        }
        handle
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
