//! Consumer-facing live query: `{ results, loading, error }` kept in sync
//! with a changing query.

use crate::config::LiveQueryConfig;
use crate::error::{QueryError, Result};
use crate::scheduler::Scheduler;
use crate::source::{DataSource, ReadySignal};
use crate::types::Query;
use parking_lot::{Condvar, Mutex};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::subscription::QuerySubscription;
use super::types::{QueryEvent, QueryState, SubscriptionOptions};

/// Inputs that decide which subscription should exist.
struct Control {
    query: Query,
    enabled: bool,
    debounce: Duration,
    subscription: Option<QuerySubscription>,
    closed: bool,
}

struct Shared {
    source: Arc<dyn DataSource>,
    scheduler: Arc<dyn Scheduler>,
    control: Mutex<Control>,
    state: Mutex<QueryState>,
    changed: Condvar,
    /// Bumped on every re-subscription; events from older ones are ignored.
    generation: AtomicU64,
}

/// Left to do after the control lock is released.
struct AwaitReady {
    signal: ReadySignal,
    generation: u64,
}

impl Shared {
    fn publish(&self, update: impl FnOnce(&mut QueryState)) {
        update(&mut *self.state.lock());
        self.changed.notify_all();
    }

    /// Tear down the current subscription and build the one `control` asks for.
    fn resubscribe(self: &Arc<Self>, control: &mut Control) -> Option<AwaitReady> {
        if let Some(previous) = control.subscription.take() {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if control.closed {
            return None;
        }

        let signal = self.source.readiness();
        let ready = signal.is_ready();

        if !control.enabled || control.query.is_empty() {
            tracing::debug!(enabled = control.enabled, "live query idle");
            self.publish(|state| {
                *state = QueryState {
                    ready,
                    ..QueryState::default()
                };
            });
            return None;
        }

        self.publish(|state| {
            *state = QueryState {
                loading: true,
                ready,
                ..QueryState::default()
            };
        });

        if !ready {
            tracing::debug!(query = ?control.query, "waiting for data source");
            return Some(AwaitReady { signal, generation });
        }

        let weak: Weak<Shared> = Arc::downgrade(self);
        let subscription = QuerySubscription::subscribe(
            Arc::clone(&self.source),
            Arc::clone(&self.scheduler),
            control.query.clone(),
            SubscriptionOptions {
                debounce: control.debounce,
                abort: None,
            },
            move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.apply(generation, event);
                }
            },
        );
        control.subscription = Some(subscription);
        None
    }

    fn apply(&self, generation: u64, event: QueryEvent) {
        {
            let mut state = self.state.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            state.loading = false;
            match event {
                QueryEvent::Results(rows) => {
                    state.results = rows;
                    state.error = None;
                }
                QueryEvent::Failed(error) => state.error = Some(error),
                QueryEvent::Recovered => state.error = None,
            }
        }
        self.changed.notify_all();
    }

    /// Change the inputs under the control lock and re-subscribe if `update`
    /// reports a change.
    fn reconfigure(self: &Arc<Self>, update: impl FnOnce(&mut Control) -> bool) {
        let waiting = {
            let mut control = self.control.lock();
            if control.closed || !update(&mut control) {
                return;
            }
            self.resubscribe(&mut control)
        };
        self.await_ready(waiting);
    }

    /// Register the readiness callback outside the control lock; it may run
    /// right away.
    fn await_ready(self: &Arc<Self>, waiting: Option<AwaitReady>) {
        if let Some(AwaitReady { signal, generation }) = waiting {
            let weak = Arc::downgrade(self);
            signal.on_ready(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.reconfigure(|_| shared.generation.load(Ordering::SeqCst) == generation);
                }
            });
        }
    }
}

/// A query whose results stay in sync with the data source.
///
/// Wraps a [`QuerySubscription`] and re-creates it whenever the query, the
/// enabled flag, or the debounce interval changes. Nothing is evaluated
/// while the source is not ready, the query is disabled, or the query text
/// is empty.
///
/// ```
/// use livequery::{LiveQuery, LiveQueryConfig, ManualScheduler, MemorySource, Query};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let source = Arc::new(MemorySource::new());
/// let query = Query::new("[:find ?name :where [?p :block/name ?name]]");
/// source.set_rows(&query, vec![json!("agent")]);
///
/// let live = LiveQuery::new(
///     source.clone(),
///     Arc::new(ManualScheduler::new()),
///     query,
///     &LiveQueryConfig::default(),
/// );
/// assert_eq!(live.results(), vec![json!("agent")]);
/// assert!(!live.is_loading());
/// ```
pub struct LiveQuery {
    shared: Arc<Shared>,
}

impl LiveQuery {
    pub fn new(
        source: Arc<dyn DataSource>,
        scheduler: Arc<dyn Scheduler>,
        query: impl Into<Query>,
        config: &LiveQueryConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            source,
            scheduler,
            control: Mutex::new(Control {
                query: query.into(),
                enabled: config.enabled,
                debounce: config.debounce(),
                subscription: None,
                closed: false,
            }),
            state: Mutex::new(QueryState::default()),
            changed: Condvar::new(),
            generation: AtomicU64::new(0),
        });

        let waiting = {
            let mut control = shared.control.lock();
            shared.resubscribe(&mut control)
        };
        shared.await_ready(waiting);

        Self { shared }
    }

    /// Snapshot of `{ results, loading, error }`.
    pub fn state(&self) -> QueryState {
        self.shared.state.lock().clone()
    }

    pub fn results(&self) -> Vec<Value> {
        self.shared.state.lock().results.clone()
    }

    /// Results deserialized into `T`.
    pub fn rows<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.shared.state.lock().rows()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.lock().loading
    }

    pub fn error(&self) -> Option<QueryError> {
        self.shared.state.lock().error.clone()
    }

    pub fn is_error(&self) -> bool {
        self.shared.state.lock().is_error()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state.lock().ready
    }

    pub fn query(&self) -> Query {
        self.shared.control.lock().query.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.control.lock().enabled
    }

    /// Switch to another query. Structurally equal queries are ignored.
    pub fn set_query(&self, query: impl Into<Query>) {
        let query = query.into();
        self.shared.reconfigure(move |control| {
            if control.query == query {
                return false;
            }
            control.query = query;
            true
        });
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.reconfigure(move |control| {
            if control.enabled == enabled {
                return false;
            }
            control.enabled = enabled;
            true
        });
    }

    pub fn set_debounce(&self, debounce: Duration) {
        self.shared.reconfigure(move |control| {
            if control.debounce == debounce {
                return false;
            }
            control.debounce = debounce;
            true
        });
    }

    /// Block until `predicate` holds for the state, or `timeout` passes.
    /// Returns whether the predicate held.
    pub fn wait_until(
        &self,
        mut predicate: impl FnMut(&QueryState) -> bool,
        timeout: Duration,
    ) -> bool {
        let mut state = self.shared.state.lock();
        if !predicate(&state) {
            self.shared
                .changed
                .wait_while_for(&mut state, |s| !predicate(s), timeout);
        }
        predicate(&state)
    }

    /// Cancel the subscription for good. Later setters are ignored.
    pub fn close(&self) {
        let mut control = self.shared.control.lock();
        if control.closed {
            return;
        }
        control.closed = true;
        self.shared.resubscribe(&mut control);
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.close();
    }
}
