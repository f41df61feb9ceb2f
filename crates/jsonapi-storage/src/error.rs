//! Errors surfaced by query execution backends.

use std::fmt;

/// Errors that can occur while executing a compiled query.
///
/// The compiler never inspects these; they are passed through to the caller
/// unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The query was rejected by the database (syntax, unknown column, ...).
    #[error("Query error: {message}")]
    QueryError {
        /// Description of the failure as reported by the backend.
        message: String,
    },

    /// A constraint was violated.
    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        /// Description of the violated constraint.
        message: String,
    },

    /// Failed to connect to the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// The backend does not support the requested operation.
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `QueryError` error.
    #[must_use]
    pub fn query_error(message: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
        }
    }

    /// Creates a new `ConstraintViolation` error.
    #[must_use]
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Unsupported` error.
    #[must_use]
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::QueryError { .. } | Self::ConstraintViolation { .. } => ErrorCategory::Query,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns true if retrying the same query may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionError { .. })
    }
}

/// Broad classification of storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The query itself was invalid.
    Query,
    /// The backend could not be reached.
    Infrastructure,
    /// The operation is not implemented by the backend.
    Unsupported,
    /// Unexpected failure inside the backend.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::query_error("column \"nope\" does not exist");
        assert_eq!(
            err.to_string(),
            "Query error: column \"nope\" does not exist"
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::connection_error("refused").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            StorageError::constraint_violation("fk").category(),
            ErrorCategory::Query
        );
        assert_eq!(ErrorCategory::Unsupported.to_string(), "unsupported");
    }

    #[test]
    fn test_is_transient() {
        assert!(StorageError::connection_error("timeout").is_transient());
        assert!(!StorageError::internal("boom").is_transient());
    }
}
