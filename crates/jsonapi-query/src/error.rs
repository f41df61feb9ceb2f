//! Error types for query compilation and fetching.

use jsonapi_storage::StorageError;
use thiserror::Error;

use crate::resolver::PathError;
use crate::sql_builder::SqlBuilderError;

/// Errors raised while compiling parameters or fetching rows.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Invalid path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },

    #[error("Path '{0}' does not end in an attribute")]
    NotAnAttribute(String),

    #[error("Relation '{relation}' on '{resource_type}' cannot be joined: {reason}")]
    UnsupportedRelation {
        resource_type: String,
        relation: String,
        reason: String,
    },

    #[error("SQL build error: {0}")]
    SqlBuilder(#[from] SqlBuilderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QueryError {
    pub fn unknown_resource_type(name: impl Into<String>) -> Self {
        Self::UnknownResourceType(name.into())
    }

    pub fn invalid_path(path: impl Into<String>, source: PathError) -> Self {
        Self::InvalidPath {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_relation(
        resource_type: impl Into<String>,
        relation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedRelation {
            resource_type: resource_type.into(),
            relation: relation.into(),
            reason: reason.into(),
        }
    }

    /// True if the error comes from the request parameters rather than from
    /// the backend or the query size.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownResourceType(_)
                | Self::InvalidPath { .. }
                | Self::NotAnAttribute(_)
                | Self::UnsupportedRelation { .. }
                | Self::SqlBuilder(SqlBuilderError::QueryTooComplex(_))
        )
    }
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = QueryError::invalid_path(
            "author.nope",
            PathError::UnknownRelation {
                resource_type: "people".into(),
                segment: "nope".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "Invalid path 'author.nope': Unknown relation 'nope' on 'people'"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_storage_error_is_not_client_error() {
        let err: QueryError = StorageError::connection_error("refused").into();
        assert!(!err.is_client_error());
        assert!(matches!(err, QueryError::Storage(_)));
    }
}
