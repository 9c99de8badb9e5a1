//! Subscription types for live query results.

use crate::abort::AbortSignal;
use crate::config::DEFAULT_DEBOUNCE_MS;
use crate::error::{QueryError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Options for a single [`QuerySubscription`](super::QuerySubscription).
#[derive(Clone, Debug)]
pub struct SubscriptionOptions {
    /// Quiet period after the last change notification before re-evaluating.
    /// Default: 300ms
    pub debounce: Duration,

    /// Tears the subscription down when fired.
    pub abort: Option<AbortSignal>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            abort: None,
        }
    }
}

/// What a subscription hands its consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryEvent {
    /// A result that differs from the last one delivered.
    Results(Vec<Value>),

    /// An evaluation failed. The subscription stays alive.
    Failed(QueryError),

    /// An evaluation succeeded after a failure, and its rows equal the last
    /// delivered rows.
    Recovered,
}

/// Consumer-facing snapshot of a [`LiveQuery`](super::LiveQuery).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryState {
    /// Last good result. Kept while `error` is set.
    pub results: Vec<Value>,

    /// True until the first evaluation of the current query lands.
    pub loading: bool,

    /// Most recent evaluation failure, cleared by the next success.
    pub error: Option<QueryError>,

    /// Whether the data source has finished initializing.
    pub ready: bool,
}

impl QueryState {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Deserialize every row into `T`.
    pub fn rows<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.results
            .iter()
            .map(|row| serde_json::from_value(row.clone()).map_err(QueryError::from))
            .collect()
    }
}
