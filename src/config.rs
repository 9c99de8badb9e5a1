//! Live query configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default quiet period before re-evaluating after a change notification.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Settings for a [`LiveQuery`](crate::LiveQuery).
///
/// Missing fields fall back to their defaults, so plugin settings can be
/// loaded from partial JSON:
///
/// ```
/// use livequery::LiveQueryConfig;
///
/// let config = LiveQueryConfig::from_json(r#"{"debounce_ms": 50}"#).unwrap();
/// assert_eq!(config.debounce_ms, 50);
/// assert!(config.enabled);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveQueryConfig {
    /// Debounce interval in milliseconds.
    /// Default: 300
    pub debounce_ms: u64,

    /// Whether the query runs at all.
    /// Default: true
    pub enabled: bool,
}

impl Default for LiveQueryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            enabled: true,
        }
    }
}

impl LiveQueryConfig {
    /// Parse from JSON settings.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
