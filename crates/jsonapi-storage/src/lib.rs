//! # jsonapi-storage
//!
//! Execution seam for the jsonapi-params query compiler.
//!
//! This crate defines the [`QueryExecutor`] trait and the data types passed
//! across it. It does not contain a database driver; backends implement the
//! trait.

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::QueryExecutor;
pub use types::{
    BuiltQuery, CompiledQuery, EagerLoad, FetchOutcome, Page, PageRequest, PaginationMeta, Row,
    SqlValue,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared executor trait object.
pub type DynExecutor = std::sync::Arc<dyn QueryExecutor>;
