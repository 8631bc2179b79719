//! Error types for the kindred engine.

use thiserror::Error;

/// Result type alias using kindred's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for kindred operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Persistent store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Raw contact not found
    #[error("Raw contact not found: {0}")]
    RawContactNotFound(i64),

    /// Aggregate not found
    #[error("Aggregate not found: {0}")]
    AggregateNotFound(i64),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for dangling-reference style failures the background pass skips
    /// over instead of aborting (a warning is logged and the pass continues).
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Error::RawContactNotFound(_) | Error::AggregateNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_store() {
        let err = Error::Store("connection lost".to_string());
        assert_eq!(err.to_string(), "Store error: connection lost");
    }

    #[test]
    fn test_error_display_raw_contact_not_found() {
        let err = Error::RawContactNotFound(42);
        assert_eq!(err.to_string(), "Raw contact not found: 42");
    }

    #[test]
    fn test_error_display_aggregate_not_found() {
        let err = Error::AggregateNotFound(7);
        assert_eq!(err.to_string(), "Aggregate not found: 7");
    }

    #[test]
    fn test_integrity_violation_classification() {
        assert!(Error::RawContactNotFound(1).is_integrity_violation());
        assert!(Error::AggregateNotFound(1).is_integrity_violation());
        assert!(!Error::Store("x".into()).is_integrity_violation());
        assert!(!Error::Internal("x".into()).is_integrity_violation());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
