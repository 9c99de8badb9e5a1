//! Core types for live queries.

use crate::equality::{canonicalize, rows_equal};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A query against the external data source: opaque text plus ordered
/// positional parameters.
///
/// Identity is structural. Two queries are equal when their text matches
/// (ignoring surrounding whitespace) and their parameters are deep-equal (so
/// `1` and `1.0` count as the same parameter). [`cache_key`](Self::cache_key)
/// follows the same rules.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl Query {
    /// Create a query without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// The "not ready yet" query. Subscribing to it does nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the positional parameters.
    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Append one positional parameter.
    pub fn bind(mut self, parameter: impl Into<Value>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    /// True when the query text is blank.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Stable string key for this query's identity. Equal queries have equal keys.
    pub fn cache_key(&self) -> String {
        let params: Vec<Value> = self.parameters.iter().map(canonicalize).collect();
        let params = serde_json::to_string(&params).unwrap_or_default();
        format!("{}\u{0}{}", self.text.trim(), params)
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.text.trim() == other.text.trim() && rows_equal(&self.parameters, &other.parameters)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self.text.split_whitespace().collect::<Vec<_>>().join(" ");
        write!(f, "Query({:?}, {:?})", text, self.parameters)
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration handle for a change listener on a data source.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}
