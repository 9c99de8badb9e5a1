//! Subscription behavior against an in-memory source on a virtual clock.

use livequery::{
    AbortController, ManualScheduler, MemorySource, Query, QueryError, QueryEvent,
    QuerySubscription, SubscriptionOptions,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(300);

struct Harness {
    source: Arc<MemorySource>,
    scheduler: Arc<ManualScheduler>,
    events: Arc<Mutex<Vec<QueryEvent>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            source: Arc::new(MemorySource::new()),
            scheduler: Arc::new(ManualScheduler::new()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn subscribe(&self, query: &Query) -> QuerySubscription {
        self.subscribe_with(query, SubscriptionOptions::default())
    }

    fn subscribe_with(&self, query: &Query, options: SubscriptionOptions) -> QuerySubscription {
        let events = Arc::clone(&self.events);
        QuerySubscription::subscribe(
            self.source.clone(),
            self.scheduler.clone(),
            query.clone(),
            options,
            move |event| events.lock().push(event),
        )
    }

    fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().clone()
    }
}

fn agents_query() -> Query {
    Query::new("[:find (pull ?p [*]) :where [?p :block/name]]")
}

// --- Delivery ---

#[test]
fn test_initial_fetch_is_immediate() {
    let h = Harness::new();
    let query = agents_query();
    h.source.set_rows(&query, vec![json!({"a": 1})]);

    let sub = h.subscribe(&query);

    // No clock movement needed.
    assert_eq!(h.events(), vec![QueryEvent::Results(vec![json!({"a": 1})])]);
    assert_eq!(sub.last_results(), Some(vec![json!({"a": 1})]));
    assert!(sub.is_active());
    assert_eq!(h.source.listener_count(), 1);
}

#[test]
fn test_equal_results_are_dropped() {
    let h = Harness::new();
    let query = agents_query();
    h.source.set_rows(&query, vec![json!({"a": 1})]);
    let _sub = h.subscribe(&query);

    // Unrelated change: same rows come back.
    h.source.notify_changed();
    h.scheduler.advance(DEBOUNCE);
    assert_eq!(h.source.evaluations_of(&query), 2);
    assert_eq!(h.events().len(), 1);

    // Real change.
    h.source.update(&query, vec![json!({"a": 1}), json!({"a": 2})]);
    h.scheduler.advance(DEBOUNCE);

    assert_eq!(
        h.events(),
        vec![
            QueryEvent::Results(vec![json!({"a": 1})]),
            QueryEvent::Results(vec![json!({"a": 1}), json!({"a": 2})]),
        ]
    );
}

#[test]
fn test_reencoded_numbers_are_not_a_change() {
    let h = Harness::new();
    let query = agents_query();
    h.source.set_rows(&query, vec![json!({"updated-at": 10})]);
    let _sub = h.subscribe(&query);

    h.source.update(&query, vec![json!({"updated-at": 10.0})]);
    h.scheduler.advance(DEBOUNCE);

    assert_eq!(h.events().len(), 1);
}

#[test]
fn test_empty_first_result_is_delivered() {
    let h = Harness::new();
    let query = agents_query();

    let _sub = h.subscribe(&query);

    assert_eq!(h.events(), vec![QueryEvent::Results(vec![])]);
}

// --- Debounce ---

#[test]
fn test_burst_triggers_one_evaluation() {
    let h = Harness::new();
    let query = agents_query();
    let _sub = h.subscribe(&query);

    for i in 0..10 {
        h.source.update(&query, vec![json!({"n": i})]);
        h.scheduler.advance(Duration::from_millis(50));
    }
    assert_eq!(h.source.evaluations_of(&query), 1);

    h.scheduler.advance(DEBOUNCE);

    // One initial, one trailing; the trailing one sees the settled state.
    assert_eq!(h.source.evaluations_of(&query), 2);
    assert_eq!(h.events().last(), Some(&QueryEvent::Results(vec![json!({"n": 9})])));
}

#[test]
fn test_custom_debounce_interval() {
    let h = Harness::new();
    let query = agents_query();
    let sub = h.subscribe_with(
        &query,
        SubscriptionOptions {
            debounce: Duration::from_millis(20),
            ..Default::default()
        },
    );

    h.source.notify_changed();
    assert!(sub.has_pending_evaluation());
    h.scheduler.advance(Duration::from_millis(20));

    assert!(!sub.has_pending_evaluation());
    assert_eq!(h.source.evaluations_of(&query), 2);
}

// --- Cancellation ---

#[test]
fn test_cancel_before_pending_fires() {
    let h = Harness::new();
    let query = agents_query();
    let sub = h.subscribe(&query);

    h.source.update(&query, vec![json!({"a": 2})]);
    assert!(sub.has_pending_evaluation());

    assert!(sub.cancel());
    h.scheduler.advance(DEBOUNCE * 2);

    assert_eq!(h.source.evaluations_of(&query), 1);
    assert_eq!(h.events(), vec![QueryEvent::Results(vec![])]);
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn test_cancel_is_idempotent() {
    let h = Harness::new();
    let sub = h.subscribe(&agents_query());

    assert!(sub.cancel());
    assert!(!sub.cancel());
    drop(sub);

    assert_eq!(h.source.registered_count(), 1);
    assert_eq!(h.source.removed_count(), 1);
    assert_eq!(h.source.listener_count(), 0);
}

#[test]
fn test_notifications_after_cancel_are_ignored() {
    let h = Harness::new();
    let query = agents_query();
    let sub = h.subscribe(&query);
    sub.cancel();

    h.source.update(&query, vec![json!(1)]);
    h.scheduler.advance(DEBOUNCE);

    assert_eq!(h.source.evaluations_of(&query), 1);
    assert!(!sub.is_active());
}

#[test]
fn test_abort_signal_tears_down() {
    let h = Harness::new();
    let query = agents_query();
    let controller = AbortController::new();

    let sub = h.subscribe_with(
        &query,
        SubscriptionOptions {
            abort: Some(controller.signal()),
            ..Default::default()
        },
    );
    h.source.notify_changed();

    controller.abort();

    assert!(!sub.is_active());
    assert_eq!(h.source.listener_count(), 0);
    h.scheduler.advance(DEBOUNCE);
    assert_eq!(h.source.evaluations_of(&query), 1);

    // Cancelling after the source-side teardown is still fine.
    assert!(!sub.cancel());
    assert_eq!(h.source.removed_count(), 1);
}

#[test]
fn test_already_aborted_signal_never_evaluates() {
    let h = Harness::new();
    let query = agents_query();
    let controller = AbortController::new();
    controller.abort();

    let sub = h.subscribe_with(
        &query,
        SubscriptionOptions {
            abort: Some(controller.signal()),
            ..Default::default()
        },
    );

    assert!(!sub.is_active());
    assert_eq!(h.source.evaluation_count(), 0);
    assert_eq!(h.source.listener_count(), 0);
}

#[test]
fn test_cancel_releases_abort_callback() {
    let h = Harness::new();
    let query = agents_query();
    let controller = AbortController::new();
    let signal = controller.signal();

    for _ in 0..5 {
        let sub = h.subscribe_with(
            &query,
            SubscriptionOptions {
                abort: Some(signal.clone()),
                ..Default::default()
            },
        );
        assert_eq!(signal.pending_callbacks(), 1);
        assert!(sub.cancel());
    }

    assert_eq!(signal.pending_callbacks(), 0);
    controller.abort();
    assert_eq!(h.source.removed_count(), 5);
}

// --- Empty queries ---

#[test]
fn test_empty_query_is_inert() {
    let h = Harness::new();
    let sub = h.subscribe(&Query::empty());

    h.source.notify_changed();
    h.scheduler.advance(DEBOUNCE);

    assert!(!sub.is_active());
    assert!(!sub.cancel());
    assert_eq!(h.source.evaluation_count(), 0);
    assert_eq!(h.source.registered_count(), 0);
    assert!(h.events().is_empty());
}

// --- Errors ---

#[test]
fn test_failure_keeps_subscription_alive() {
    let h = Harness::new();
    let query = agents_query();
    h.source
        .fail_next(&query, QueryError::Evaluation("datascript exception".into()));

    let sub = h.subscribe(&query);
    assert_eq!(
        h.events(),
        vec![QueryEvent::Failed(QueryError::Evaluation(
            "datascript exception".into()
        ))]
    );
    assert!(sub.is_active());
    assert_eq!(sub.last_results(), None);

    h.source.update(&query, vec![json!({"a": 1})]);
    h.scheduler.advance(DEBOUNCE);

    assert_eq!(
        h.events().last(),
        Some(&QueryEvent::Results(vec![json!({"a": 1})]))
    );
}

// --- Independence ---

#[test]
fn test_subscriptions_do_not_share_state() {
    let h = Harness::new();
    let q1 = agents_query();
    let q2 = Query::new("[:find ?b :where [?b :block/content]]");
    h.source.set_rows(&q1, vec![json!("same")]);
    h.source.set_rows(&q2, vec![json!("same")]);

    let first = h.subscribe(&q1);
    let second = h.subscribe(&q2);

    // Both get their own first delivery even though rows are equal.
    assert_eq!(h.events().len(), 2);
    assert_ne!(first.id(), second.id());

    first.cancel();
    h.source.update(&q2, vec![json!("changed")]);
    h.scheduler.advance(DEBOUNCE);

    assert_eq!(h.events().len(), 3);
    assert_eq!(h.source.evaluations_of(&q1), 1);
    assert_eq!(h.source.listener_count(), 1);
}

#[test]
fn test_parameters_are_part_of_identity() {
    let h = Harness::new();
    let base = Query::new("[:find ?b :in $ ?name :where [?p :block/name ?name]]");
    let researcher = base.clone().bind("researcher");
    let writer = base.bind("writer");
    h.source.set_rows(&researcher, vec![json!("r")]);
    h.source.set_rows(&writer, vec![json!("w")]);

    let _sub = h.subscribe(&writer);

    assert_eq!(h.events(), vec![QueryEvent::Results(vec![json!("w")])]);
}
