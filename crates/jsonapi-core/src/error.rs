use thiserror::Error;

/// Core error types for model definition and lookup.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Unknown relation {relation} on {resource_type}")]
    UnknownRelation {
        resource_type: String,
        relation: String,
    },

    #[error("Invalid model schema: {0}")]
    InvalidSchema(String),

    #[error("Unknown naming convention: {0}")]
    UnknownNamingConvention(String),

    #[error("Schema parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a new UnknownResourceType error
    pub fn unknown_resource_type(resource_type: impl Into<String>) -> Self {
        Self::UnknownResourceType(resource_type.into())
    }

    /// Create a new UnknownRelation error
    pub fn unknown_relation(resource_type: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::UnknownRelation {
            resource_type: resource_type.into(),
            relation: relation.into(),
        }
    }

    /// Create a new InvalidSchema error
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema(message.into())
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
