//! In-process data source.

use super::{ChangeListener, DataSource, ReadySignal};
use crate::error::{QueryError, Result};
use crate::types::{ListenerId, Query};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
struct MemoryState {
    /// Rows by query identity.
    rows: HashMap<String, Vec<Value>>,
    /// One-shot failures by query identity, consumed in order.
    failures: HashMap<String, VecDeque<QueryError>>,
    listeners: HashMap<ListenerId, ChangeListener>,
    next_listener: u64,
    /// Evaluations by query identity.
    evaluations: HashMap<String, usize>,
    total_evaluations: usize,
    registered: usize,
    removed: usize,
}

/// A [`DataSource`] holding query results in memory.
///
/// Results are set per query with [`set_rows`](Self::set_rows); a query with
/// no rows set evaluates to an empty result. Change notifications are fired
/// by hand with [`notify_changed`](Self::notify_changed).
pub struct MemorySource {
    state: Mutex<MemoryState>,
    ready: ReadySignal,
}

impl MemorySource {
    /// A source that is ready immediately.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            ready: ReadySignal::resolved(),
        }
    }

    /// A source that refuses evaluation until [`mark_ready`](Self::mark_ready).
    pub fn pending() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            ready: ReadySignal::new(),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.mark_ready();
    }

    /// Set the rows `query` evaluates to. Does not notify listeners.
    pub fn set_rows(&self, query: &Query, rows: Vec<Value>) {
        self.state.lock().rows.insert(query.cache_key(), rows);
    }

    /// Make the next evaluation of `query` fail with `error`.
    pub fn fail_next(&self, query: &Query, error: QueryError) {
        self.state
            .lock()
            .failures
            .entry(query.cache_key())
            .or_default()
            .push_back(error);
    }

    /// Invoke every registered listener, outside the source's lock.
    pub fn notify_changed(&self) {
        let listeners: Vec<ChangeListener> =
            self.state.lock().listeners.values().cloned().collect();

        tracing::trace!(listeners = listeners.len(), "memory source changed");
        for listener in listeners {
            listener();
        }
    }

    /// Set rows and notify in one step.
    pub fn update(&self, query: &Query, rows: Vec<Value>) {
        self.set_rows(query, rows);
        self.notify_changed();
    }

    /// Total evaluations performed.
    pub fn evaluation_count(&self) -> usize {
        self.state.lock().total_evaluations
    }

    /// Evaluations performed for one query.
    pub fn evaluations_of(&self, query: &Query) -> usize {
        self.state
            .lock()
            .evaluations
            .get(&query.cache_key())
            .copied()
            .unwrap_or(0)
    }

    /// Listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Listeners ever registered.
    pub fn registered_count(&self) -> usize {
        self.state.lock().registered
    }

    /// Successful listener removals.
    pub fn removed_count(&self) -> usize {
        self.state.lock().removed
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for MemorySource {
    fn readiness(&self) -> ReadySignal {
        self.ready.clone()
    }

    fn evaluate(&self, query: &Query) -> Result<Vec<Value>> {
        if !self.ready.is_ready() {
            return Err(QueryError::NotReady);
        }

        let key = query.cache_key();
        let mut state = self.state.lock();
        state.total_evaluations += 1;
        *state.evaluations.entry(key.clone()).or_default() += 1;

        if let Some(error) = state.failures.get_mut(&key).and_then(|f| f.pop_front()) {
            return Err(error);
        }

        Ok(state.rows.get(&key).cloned().unwrap_or_default())
    }

    fn on_change(&self, listener: ChangeListener) -> ListenerId {
        let mut state = self.state.lock();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.insert(id, listener);
        state.registered += 1;
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let removed = state.listeners.remove(&id).is_some();
        if removed {
            state.removed += 1;
        }
        removed
    }
}
