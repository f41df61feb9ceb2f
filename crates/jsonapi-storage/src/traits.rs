//! The execution seam between the query compiler and a database.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{CompiledQuery, Page, PageRequest, Row};

/// Executes compiled queries and hydrates requested relations.
///
/// The compiler performs no I/O; everything that touches a database goes
/// through this trait. Implementations must be thread-safe (`Send + Sync`).
/// Failures are reported as-is and are never retried by the caller.
///
/// # Example
///
/// ```ignore
/// use jsonapi_storage::{CompiledQuery, QueryExecutor, Row, StorageError};
///
/// async fn first_row(executor: &dyn QueryExecutor, query: &CompiledQuery) -> Result<Row, StorageError> {
///     executor
///         .fetch_one(query)
///         .await?
///         .ok_or_else(|| StorageError::internal("no rows"))
/// }
/// ```
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Fetches the first matching row, or `None` when nothing matches.
    async fn fetch_one(&self, query: &CompiledQuery) -> Result<Option<Row>, StorageError>;

    /// Fetches every matching row.
    async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Row>, StorageError>;

    /// Fetches one page of matching rows together with pagination metadata.
    ///
    /// `CompiledQuery::query` already carries the page window and
    /// `CompiledQuery::count_query` counts the full result set; `page` is
    /// used to build the [`crate::PaginationMeta`].
    async fn fetch_page(
        &self,
        query: &CompiledQuery,
        page: &PageRequest,
    ) -> Result<Page, StorageError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
