use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while connecting, querying or listing structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The descriptor is missing fields its engine requires.
    /// Detected before any backend call.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Document query text does not parse into `{db, collection, operation, filter}`.
    #[error("Malformed query: {0}")]
    MalformedQuery(String),
    #[error("Backend failure: {0}")]
    BackendFailure(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection with ID {0} not found")]
    UnknownConnection(String),
    #[error("Driver not available: {0} (not compiled)")]
    DriverNotAvailable(&'static str),
}

impl ConnectionError {
    /// Whether the failure happened at or beyond the backend boundary,
    /// as opposed to being caught locally before any round trip.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(
            self,
            ConnectionError::InvalidConfiguration(_) | ConnectionError::MalformedQuery(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors_are_not_backend_failures() {
        assert!(!ConnectionError::InvalidConfiguration("path".into()).is_backend_failure());
        assert!(!ConnectionError::MalformedQuery("db".into()).is_backend_failure());
        assert!(ConnectionError::BackendFailure("boom".into()).is_backend_failure());
        assert!(ConnectionError::Timeout(Duration::from_secs(1)).is_backend_failure());
        assert!(ConnectionError::UnknownConnection("x".into()).is_backend_failure());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConnectionError::UnknownConnection("abc".into()).to_string(),
            "Connection with ID abc not found"
        );
        assert_eq!(
            ConnectionError::DriverNotAvailable("mongodb").to_string(),
            "Driver not available: mongodb (not compiled)"
        );
    }
}
