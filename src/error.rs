//! Error types for live query subscriptions.

use thiserror::Error;

/// Main error type for query evaluation and subscription plumbing.
///
/// Errors are cloneable so the consumer-facing [`QueryState`](crate::QueryState)
/// can keep the most recent failure next to the last good results.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Query evaluation failed: {0}")]
    Evaluation(String),

    #[error("Data source is not ready")]
    NotReady,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        QueryError::Deserialization(e.to_string())
    }
}

impl From<std::io::Error> for QueryError {
    fn from(e: std::io::Error) -> Self {
        QueryError::Io(e.to_string())
    }
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert() {
        let err: QueryError = std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads").into();
        assert_eq!(err, QueryError::Io("no threads".to_string()));
        assert_eq!(err.to_string(), "IO error: no threads");
    }
}
