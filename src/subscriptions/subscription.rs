//! A single debounced, deduplicated query subscription.

use crate::abort::AbortRegistration;
use crate::debounce::Debouncer;
use crate::equality::rows_equal;
use crate::scheduler::Scheduler;
use crate::source::DataSource;
use crate::types::{ListenerId, Query, SubscriptionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::types::{QueryEvent, SubscriptionOptions};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

type Handler = Box<dyn FnMut(QueryEvent) + Send>;

/// Evaluation bookkeeping, owned by one subscription.
#[derive(Default)]
struct EvalState {
    /// Last delivered rows (None until the first success).
    last: Option<Vec<Value>>,
    /// Whether the most recent evaluation failed.
    failed: bool,
    /// An evaluation is running right now.
    in_flight: bool,
    /// Another evaluation was requested while one was running.
    rerun: bool,
}

struct Inner {
    id: SubscriptionId,
    query: Query,
    source: Arc<dyn DataSource>,
    handler: Mutex<Handler>,
    eval: Mutex<EvalState>,
    cancelled: AtomicBool,
    debouncer: Debouncer,
    listener: Mutex<Option<ListenerId>>,
    abort_registration: Mutex<Option<AbortRegistration>>,
    options: SubscriptionOptions,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Change notification from the source.
    fn on_change(&self) {
        if self.is_cancelled() {
            return;
        }
        if self.options.abort.as_ref().map_or(false, |s| s.is_aborted()) {
            self.cancel();
            return;
        }

        tracing::trace!(subscription = %self.id, "change notification");
        self.debouncer.trigger();

        // Lost a race with cancel(): disarm what we just armed.
        if self.is_cancelled() {
            self.debouncer.cancel();
        }
    }

    /// Evaluate the query and deliver the outcome.
    ///
    /// Evaluations never overlap: a request arriving mid-evaluation is folded
    /// into one more pass once the running evaluation settles.
    fn evaluate(&self) {
        {
            let mut eval = self.eval.lock();
            if self.is_cancelled() {
                return;
            }
            if eval.in_flight {
                eval.rerun = true;
                return;
            }
            eval.in_flight = true;
        }

        loop {
            tracing::debug!(
                subscription = %self.id,
                query = ?self.query,
                "running query"
            );
            let outcome = self.source.evaluate(&self.query);

            let event = {
                let mut eval = self.eval.lock();
                if self.is_cancelled() {
                    eval.in_flight = false;
                    return;
                }

                match outcome {
                    Ok(rows) => {
                        let unchanged = eval
                            .last
                            .as_ref()
                            .map_or(false, |last| rows_equal(last, &rows));
                        let recovered = std::mem::replace(&mut eval.failed, false);

                        if !unchanged {
                            eval.last = Some(rows.clone());
                            Some(QueryEvent::Results(rows))
                        } else if recovered {
                            Some(QueryEvent::Recovered)
                        } else {
                            tracing::debug!(subscription = %self.id, "result unchanged");
                            None
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            subscription = %self.id,
                            query = ?self.query,
                            %error,
                            "query evaluation failed"
                        );
                        eval.failed = true;
                        Some(QueryEvent::Failed(error))
                    }
                }
            };

            if let Some(event) = event {
                let mut handler = self.handler.lock();
                if !self.is_cancelled() {
                    (*handler)(event);
                }
            }

            let mut eval = self.eval.lock();
            if eval.rerun && !self.is_cancelled() {
                eval.rerun = false;
                continue;
            }
            eval.in_flight = false;
            eval.rerun = false;
            return;
        }
    }

    fn release_abort_registration(&self) {
        let registration = self.abort_registration.lock().take();
        if let (Some(registration), Some(signal)) = (registration, self.options.abort.as_ref()) {
            signal.remove(registration);
        }
    }

    /// Cancel once: disarm the debounce and remove the listener.
    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.debouncer.cancel();
        if let Some(listener) = self.listener.lock().take() {
            self.source.remove_listener(listener);
        }
        self.release_abort_registration();

        tracing::debug!(subscription = %self.id, "subscription cancelled");
        true
    }
}

/// A live binding between one [`Query`] and a consumer callback.
///
/// On creation the query is evaluated immediately, on the calling thread.
/// After that, every change notification from the source restarts a
/// debounce window; the query is re-evaluated once the window closes
/// (trailing edge). The handler only sees [`QueryEvent::Results`] when the
/// rows are not deep-equal to the previous delivery.
///
/// An empty query creates an inert subscription: nothing is evaluated and
/// no listener is registered.
///
/// Dropping the subscription cancels it.
pub struct QuerySubscription {
    id: SubscriptionId,
    query: Query,
    inner: Option<Arc<Inner>>,
}

impl QuerySubscription {
    /// Subscribe `handler` to `query` on `source`.
    pub fn subscribe<F>(
        source: Arc<dyn DataSource>,
        scheduler: Arc<dyn Scheduler>,
        query: Query,
        options: SubscriptionOptions,
        handler: F,
    ) -> Self
    where
        F: FnMut(QueryEvent) + Send + 'static,
    {
        let id = SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::SeqCst));

        if query.is_empty() {
            tracing::debug!(subscription = %id, "empty query, nothing to subscribe");
            return Self {
                id,
                query,
                inner: None,
            };
        }

        let debounce = options.debounce;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            Inner {
                id,
                query: query.clone(),
                source: Arc::clone(&source),
                handler: Mutex::new(Box::new(handler)),
                eval: Mutex::new(EvalState::default()),
                cancelled: AtomicBool::new(false),
                debouncer: Debouncer::new(scheduler, debounce, move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.evaluate();
                    }
                }),
                listener: Mutex::new(None),
                abort_registration: Mutex::new(None),
                options,
            }
        });

        let weak = Arc::downgrade(&inner);
        let listener = source.on_change(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_change();
            }
        }));
        *inner.listener.lock() = Some(listener);

        if let Some(signal) = inner.options.abort.clone() {
            let weak = Arc::downgrade(&inner);
            let registration = signal.on_abort(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.cancel();
                }
            });
            *inner.abort_registration.lock() = Some(registration);
            // Already fired and cancelled before the registration was stored.
            if inner.is_cancelled() {
                inner.release_abort_registration();
            }
        }

        // Initial fetch is not debounced.
        inner.evaluate();

        Self {
            id,
            query,
            inner: Some(inner),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// True until cancelled. Inert subscriptions are never active.
    pub fn is_active(&self) -> bool {
        self.inner.as_ref().map_or(false, |inner| !inner.is_cancelled())
    }

    /// True while a debounced re-evaluation is armed.
    pub fn has_pending_evaluation(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(false, |inner| inner.debouncer.is_pending())
    }

    /// Rows most recently delivered to the handler.
    pub fn last_results(&self) -> Option<Vec<Value>> {
        self.inner
            .as_ref()
            .and_then(|inner| inner.eval.lock().last.clone())
    }

    /// Stop the subscription. Idempotent; returns true only for the call that
    /// actually cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.as_ref().map_or(false, |inner| inner.cancel())
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for QuerySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::scheduler::ManualScheduler;
    use crate::source::MemorySource;
    use serde_json::json;
    use std::time::Duration;

    fn collect() -> (Arc<Mutex<Vec<QueryEvent>>>, impl FnMut(QueryEvent) + Send + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |event| sink.lock().push(event))
    }

    /// Source that runs a hook from inside `evaluate`, before answering.
    struct HookedSource {
        rows: MemorySource,
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl DataSource for HookedSource {
        fn readiness(&self) -> crate::source::ReadySignal {
            self.rows.readiness()
        }

        fn evaluate(&self, query: &Query) -> crate::error::Result<Vec<Value>> {
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            self.rows.evaluate(query)
        }

        fn on_change(&self, listener: crate::source::ChangeListener) -> ListenerId {
            self.rows.on_change(listener)
        }

        fn remove_listener(&self, id: ListenerId) -> bool {
            self.rows.remove_listener(id)
        }
    }

    #[test]
    fn test_request_during_evaluation_runs_after_it() {
        let source = Arc::new(HookedSource {
            rows: MemorySource::new(),
            hook: Mutex::new(None),
        });
        let scheduler = Arc::new(ManualScheduler::new());
        let query = Query::new("[:find ?p]");
        source.rows.set_rows(&query, vec![json!(1)]);

        let (events, handler) = collect();
        let sub = QuerySubscription::subscribe(
            source.clone(),
            scheduler.clone(),
            query.clone(),
            SubscriptionOptions::default(),
            handler,
        );

        // While the debounced evaluation is running, the data changes and
        // another evaluation is requested.
        let inner = sub.inner.clone().unwrap();
        let rows = Arc::clone(&source);
        let q = query.clone();
        *source.hook.lock() = Some(Box::new(move || {
            rows.rows.set_rows(&q, vec![json!(2)]);
            inner.evaluate();
        }));

        source.rows.notify_changed();
        scheduler.advance(Duration::from_millis(300));

        // initial + debounced + folded rerun, never two at once
        assert_eq!(source.rows.evaluations_of(&query), 3);
        assert_eq!(
            *events.lock(),
            vec![
                QueryEvent::Results(vec![json!(1)]),
                QueryEvent::Results(vec![json!(2)]),
            ]
        );
        assert!(!sub.inner.as_ref().unwrap().eval.lock().in_flight);
    }

    #[test]
    fn test_recovered_after_failure_with_same_rows() {
        let source = Arc::new(MemorySource::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let query = Query::new("[:find ?p]");
        source.set_rows(&query, vec![json!({"a": 1})]);

        let (events, handler) = collect();
        let _sub = QuerySubscription::subscribe(
            source.clone(),
            scheduler.clone(),
            query.clone(),
            SubscriptionOptions::default(),
            handler,
        );

        source.fail_next(&query, QueryError::Evaluation("backend".into()));
        source.notify_changed();
        scheduler.advance(Duration::from_millis(300));

        source.notify_changed();
        scheduler.advance(Duration::from_millis(300));

        assert_eq!(
            *events.lock(),
            vec![
                QueryEvent::Results(vec![json!({"a": 1})]),
                QueryEvent::Failed(QueryError::Evaluation("backend".into())),
                QueryEvent::Recovered,
            ]
        );
    }

    #[test]
    fn test_drop_releases_listener() {
        let source = Arc::new(MemorySource::new());
        let scheduler = Arc::new(ManualScheduler::new());

        let sub = QuerySubscription::subscribe(
            source.clone(),
            scheduler,
            Query::new("[:find ?p]"),
            SubscriptionOptions::default(),
            |_| {},
        );
        assert_eq!(source.listener_count(), 1);

        drop(sub);
        assert_eq!(source.listener_count(), 0);
        assert_eq!(source.removed_count(), 1);
    }
}
