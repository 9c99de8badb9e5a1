//! The external data source a live query reads from.
//!
//! The host owns the database and its query engine; this crate only needs
//! four things from it:
//! - a readiness signal that resolves once the database is usable
//! - evaluation of a query with positional parameters
//! - registration of a payload-free change listener
//! - removal of that listener
//!
//! [`MemorySource`] is an in-process implementation used by the tests and
//! handy for embedding.

mod memory;
mod ready;

pub use memory::MemorySource;
pub use ready::ReadySignal;

use crate::error::Result;
use crate::types::{ListenerId, Query};
use serde_json::Value;
use std::sync::Arc;

/// Callback invoked on every external mutation. Carries no payload; the
/// subscriber re-evaluates to learn what changed.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Host database boundary.
pub trait DataSource: Send + Sync {
    /// Signal that resolves once queries may be evaluated.
    fn readiness(&self) -> ReadySignal;

    /// Evaluate `query` and return its rows.
    fn evaluate(&self, query: &Query) -> Result<Vec<Value>>;

    /// Register a change listener.
    fn on_change(&self, listener: ChangeListener) -> ListenerId;

    /// Remove a listener. Returns false if it was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}
