//! Live query subscriptions.
//!
//! Two layers:
//! - [`QuerySubscription`]: one query, one change listener, debounced
//!   re-evaluation, deep-equality deduplication, idempotent cancel
//! - [`LiveQuery`]: the consumer view (`results`, `loading`, `error`) that
//!   gates on readiness and re-subscribes when its inputs change
//!
//! # Example
//!
//! ```ignore
//! let subscription = QuerySubscription::subscribe(
//!     source.clone(),
//!     scheduler.clone(),
//!     Query::new(AGENT_LIST_QUERY),
//!     SubscriptionOptions::default(),
//!     |event| match event {
//!         QueryEvent::Results(rows) => println!("{} agents", rows.len()),
//!         QueryEvent::Failed(error) => eprintln!("query failed: {error}"),
//!         QueryEvent::Recovered => {}
//!     },
//! );
//!
//! // ... later
//! subscription.cancel();
//! ```

mod live;
mod subscription;
mod types;

pub use live::LiveQuery;
pub use subscription::QuerySubscription;
pub use types::{QueryEvent, QueryState, SubscriptionOptions};
