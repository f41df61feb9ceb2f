//! Query assembly and fetching.
//!
//! [`QueryAssembler`] runs the compiler stages in a fixed order against one
//! [`QueryBuilder`]:
//!
//! 1. relation dependencies of filter, group and sort keys, and their joins
//! 2. filters
//! 3. grouping
//! 4. sorting
//! 5. includes
//! 6. sparse fieldsets
//! 7. the caller's extra callback
//! 8. pagination
//!
//! The result is handed to a [`QueryExecutor`] as a [`CompiledQuery`].

use std::fmt;
use std::sync::Arc;

use jsonapi_core::TypeRegistry;
use jsonapi_storage::{CompiledQuery, DynExecutor, FetchOutcome, PageRequest};

use crate::config::QueryConfig;
use crate::context::CompilationContext;
use crate::dependencies::collect_dependencies;
use crate::error::{QueryError, QueryResult};
use crate::fields::{compile_fields, has_base_fields};
use crate::filter::compile_filters;
use crate::group::compile_group;
use crate::include::compile_includes;
use crate::joins::emit_joins;
use crate::params::QueryParams;
use crate::sort::compile_sort;
use crate::sql_builder::{ColumnRef, QueryBuilder, SqlBuilderError};

/// Callback applied to the builder after the parameters are compiled.
pub type ExtraQuery = Box<dyn FnOnce(&mut QueryBuilder) + Send>;

/// One fetch: which type, which parameters, and how to shape the result.
pub struct FetchRequest {
    /// Registered resource type name
    pub base_type: String,
    pub params: QueryParams,
    /// Fetch every matching row (or a page) rather than the first one
    pub collection: bool,
    /// Alias used for the base table instead of its table name
    pub type_override: Option<String>,
    pub extra: Option<ExtraQuery>,
}

impl FetchRequest {
    /// A collection fetch of `base_type`.
    pub fn new(base_type: impl Into<String>, params: QueryParams) -> Self {
        Self {
            base_type: base_type.into(),
            params,
            collection: true,
            type_override: None,
            extra: None,
        }
    }

    /// Fetch only the first matching row.
    #[must_use]
    pub fn single(mut self) -> Self {
        self.collection = false;
        self
    }

    #[must_use]
    pub fn with_type_override(mut self, alias: impl Into<String>) -> Self {
        self.type_override = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: impl FnOnce(&mut QueryBuilder) + Send + 'static) -> Self {
        self.extra = Some(Box::new(extra));
        self
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("base_type", &self.base_type)
            .field("params", &self.params)
            .field("collection", &self.collection)
            .field("type_override", &self.type_override)
            .field("extra", &self.extra.is_some())
            .finish()
    }
}

/// A fully compiled builder, not yet rendered.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub resource_type: String,
    pub builder: QueryBuilder,
    /// Page window, for collection fetches only
    pub page: Option<PageRequest>,
    pub collection: bool,
}

impl PreparedQuery {
    /// Render the SQL. A paged query carries its LIMIT and OFFSET; the count
    /// query never does.
    pub fn compile(&self) -> Result<CompiledQuery, SqlBuilderError> {
        let query = match &self.page {
            Some(page) => self.builder.build_page(page)?,
            None => self.builder.build()?,
        };
        Ok(CompiledQuery {
            resource_type: self.resource_type.clone(),
            query,
            count_query: self.builder.build_count()?,
            with_related: self.builder.eager_loads().to_vec(),
        })
    }
}

/// Compiles JSON:API parameters against a registry and fetches through an
/// executor.
pub struct QueryAssembler {
    registry: Arc<dyn TypeRegistry>,
    executor: DynExecutor,
    config: QueryConfig,
}

impl QueryAssembler {
    pub fn new(registry: Arc<dyn TypeRegistry>, executor: DynExecutor) -> Self {
        Self {
            registry,
            executor,
            config: QueryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Run every compiler stage and return the populated builder.
    pub fn prepare(&self, request: FetchRequest) -> QueryResult<PreparedQuery> {
        let FetchRequest {
            base_type,
            params,
            collection,
            type_override,
            extra,
        } = request;

        let base = self
            .registry
            .resource_type(&base_type)
            .ok_or_else(|| QueryError::unknown_resource_type(&base_type))?;
        let alias = type_override.unwrap_or_else(|| base.table.clone());

        let mut qb = QueryBuilder::new(base.table.clone(), alias.clone())
            .with_schema(self.config.schema.clone())
            .with_limits(self.config.max_joins, self.config.max_conditions);
        let mut ctx = CompilationContext::new(
            self.registry.as_ref(),
            base,
            alias.clone(),
            self.config.strict_paths,
        );

        let dependencies = collect_dependencies(&ctx, &params.filter, &params.group, &params.sort)?;
        if !dependencies.is_empty() {
            emit_joins(&ctx, &mut qb, &dependencies)?;
            if !has_base_fields(&ctx, &params.fields) {
                qb.select_column(ColumnRef::all(alias));
            }
        }

        compile_filters(&mut ctx, &mut qb, &params.filter)?;
        compile_group(&mut ctx, &mut qb, &params.group)?;
        compile_sort(&mut ctx, &mut qb, &params.sort)?;
        compile_includes(&mut ctx, &mut qb, &params.include, &params.fields)?;
        compile_fields(&mut ctx, &mut qb, &params.fields, &params.include)?;

        if let Some(extra) = extra {
            extra(&mut qb);
        }

        let page = if collection {
            params.page.or(self.config.pagination)
        } else {
            None
        };

        tracing::debug!(
            resource_type = %base_type,
            joins = qb.joins().len(),
            conditions = qb.conditions().len(),
            includes = qb.eager_loads().len(),
            "Compiled query parameters"
        );

        Ok(PreparedQuery {
            resource_type: base_type,
            builder: qb,
            page,
            collection,
        })
    }

    /// Compile a request into SQL without executing it.
    pub fn compile(&self, request: FetchRequest) -> QueryResult<CompiledQuery> {
        Ok(self.prepare(request)?.compile()?)
    }

    /// Compile a request and fetch its rows.
    ///
    /// Collection requests return a page when pagination applies and every
    /// row otherwise; single requests return the first row.
    #[tracing::instrument(
        skip(self, request),
        fields(resource_type = %request.base_type, collection = request.collection)
    )]
    pub async fn fetch_with_params(&self, request: FetchRequest) -> QueryResult<FetchOutcome> {
        let (prepared, compiled) = self
            .prepare(request)
            .and_then(|prepared| {
                let compiled = prepared.compile()?;
                Ok((prepared, compiled))
            })
            .inspect_err(log_rejected)?;

        tracing::debug!(backend = self.executor.backend_name(), sql = %compiled.query, "Executing query");

        let result = match (prepared.collection, prepared.page) {
            (true, Some(page)) => self.executor.fetch_page(&compiled, &page).await.map(FetchOutcome::Page),
            (true, None) => self.executor.fetch_all(&compiled).await.map(FetchOutcome::Many),
            (false, _) => self.executor.fetch_one(&compiled).await.map(FetchOutcome::One),
        };

        result.map_err(|err| {
            tracing::warn!(
                backend = self.executor.backend_name(),
                category = %err.category(),
                transient = err.is_transient(),
                error = %err,
                "Query execution failed"
            );
            QueryError::from(err)
        })
    }
}

fn log_rejected(err: &QueryError) {
    if err.is_client_error() {
        tracing::debug!(error = %err, "Rejected query parameters");
    } else {
        tracing::warn!(error = %err, "Failed to compile query");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::blog_registry;
    use crate::params::{Filter, FilterOperator, FilterValue};
    use crate::parser::parse_query_string;
    use async_trait::async_trait;
    use jsonapi_storage::{ErrorCategory, Page, QueryExecutor, Row, SqlValue, StorageError};
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_test::block_on;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        One(CompiledQuery),
        All(CompiledQuery),
        Page(CompiledQuery, PageRequest),
    }

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<Call>>,
        fail: bool,
    }

    impl RecordingExecutor {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) -> Result<(), StorageError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                return Err(StorageError::connection_error("connection refused"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn fetch_one(&self, query: &CompiledQuery) -> Result<Option<Row>, StorageError> {
            self.record(Call::One(query.clone()))?;
            Ok(Some(json!({"id": 1})))
        }

        async fn fetch_all(&self, query: &CompiledQuery) -> Result<Vec<Row>, StorageError> {
            self.record(Call::All(query.clone()))?;
            Ok(vec![json!({"id": 1}), json!({"id": 2})])
        }

        async fn fetch_page(
            &self,
            query: &CompiledQuery,
            page: &PageRequest,
        ) -> Result<Page, StorageError> {
            self.record(Call::Page(query.clone(), *page))?;
            Ok(Page {
                rows: vec![json!({"id": 1})],
                pagination: Some(page.meta(11)),
            })
        }

        fn backend_name(&self) -> &'static str {
            "recording"
        }
    }

    fn assembler(executor: Arc<RecordingExecutor>) -> QueryAssembler {
        QueryAssembler::new(Arc::new(blog_registry()), executor)
    }

    #[test]
    fn test_full_compile() {
        let executor = Arc::new(RecordingExecutor::default());
        let params = parse_query_string(
            "include=comments&fields[comments]=body&filter[author.country.name]=France\
             &filter[like][title]=rust&sort=-createdAt,author.lastName",
        )
        .unwrap();

        let compiled = assembler(executor)
            .compile(FetchRequest::new("articles", params))
            .unwrap();

        assert_eq!(
            compiled.query.sql,
            "SELECT \"articles\".* FROM \"articles\" \
             LEFT OUTER JOIN \"people\" AS \"author\" ON \"articles\".\"author_id\" = \"author\".\"id\" \
             LEFT OUTER JOIN \"countries\" AS \"country\" ON \"author\".\"country_id\" = \"country\".\"id\" \
             WHERE \"country\".\"name\" IN ($1) AND LOWER(\"articles\".\"title\"::text) LIKE LOWER($2) \
             ORDER BY \"articles\".\"createdAt\" DESC, \"author\".\"last_name\" ASC"
        );
        assert_eq!(
            compiled.query.params,
            vec![SqlValue::Text("France".into()), SqlValue::Text("%rust%".into())]
        );
        assert_eq!(compiled.query.sql.matches("JOIN \"people\"").count(), 1);
        assert_eq!(
            compiled.with_related,
            vec![jsonapi_storage::EagerLoad::with_columns(
                "comments",
                vec!["id".into(), "body".into(), "article_id".into()]
            )]
        );
        assert!(compiled.count_query.sql.starts_with("SELECT COUNT(*) AS total FROM \"articles\" LEFT OUTER JOIN"));
    }

    #[test]
    fn test_list_and_comma_string_are_equivalent() {
        let executor = Arc::new(RecordingExecutor::default());
        let assembler = assembler(executor);

        let a = assembler
            .compile(FetchRequest::new(
                "articles",
                QueryParams::new().with_filter(Filter::new().with_equality("id", FilterValue::single("1,2,3"))),
            ))
            .unwrap();
        let b = assembler
            .compile(FetchRequest::new(
                "articles",
                QueryParams::new().with_filter(
                    Filter::new().with_equality("id", FilterValue::many([Some("1"), Some("2"), Some("3")])),
                ),
            ))
            .unwrap();
        assert_eq!(a.query, b.query);
    }

    #[test]
    fn test_unresolvable_filter_dropped_siblings_kept() {
        let executor = Arc::new(RecordingExecutor::default());
        let params = QueryParams::new().with_filter(
            Filter::new()
                .with_equality("editor.name", FilterValue::single("x"))
                .with_typed(FilterOperator::Gt, "views", FilterValue::single("3")),
        );
        let compiled = assembler(executor)
            .compile(FetchRequest::new("articles", params))
            .unwrap();
        assert_eq!(
            compiled.query.sql,
            "SELECT * FROM \"articles\" WHERE \"articles\".\"views\" > $1"
        );
    }

    #[test]
    fn test_strict_paths_reject() {
        let executor = Arc::new(RecordingExecutor::default());
        let config = QueryConfig {
            strict_paths: true,
            ..QueryConfig::default()
        };
        let params = QueryParams::new().with_sort(["editor.name"]);
        let err = assembler(executor)
            .with_config(config)
            .compile(FetchRequest::new("articles", params))
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_aggregate_fields() {
        let executor = Arc::new(RecordingExecutor::default());
        let params = QueryParams::new()
            .with_fields("", ["status", "count(id)"])
            .with_group(["status"]);
        let compiled = assembler(executor)
            .compile(FetchRequest::new("articles", params))
            .unwrap();
        assert_eq!(
            compiled.query.sql,
            "SELECT DISTINCT \"articles\".\"status\", count(\"articles\".\"id\") AS \"count\" FROM \"articles\" GROUP BY \"articles\".\"status\""
        );
    }

    #[test]
    fn test_type_override_and_extra_callback() {
        let executor = Arc::new(RecordingExecutor::default());
        let request = FetchRequest::new("articles", QueryParams::new().with_sort(["title"]))
            .with_type_override("posts")
            .with_extra(|qb| {
                qb.where_condition(crate::sql_builder::Condition::IsNull(ColumnRef::new(
                    "posts",
                    "deleted_at",
                )))
            });
        let compiled = assembler(executor).compile(request).unwrap();
        assert_eq!(
            compiled.query.sql,
            "SELECT * FROM \"articles\" AS \"posts\" WHERE \"posts\".\"deleted_at\" IS NULL ORDER BY \"posts\".\"title\" ASC"
        );
    }

    #[test]
    fn test_unknown_resource_type() {
        let executor = Arc::new(RecordingExecutor::default());
        let err = assembler(executor)
            .compile(FetchRequest::new("ghosts", QueryParams::new()))
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownResourceType(name) if name == "ghosts"));
    }

    #[test]
    fn test_too_many_joins() {
        let executor = Arc::new(RecordingExecutor::default());
        let config = QueryConfig {
            max_joins: 1,
            ..QueryConfig::default()
        };
        let params = QueryParams::new().with_sort(["author.country.name"]);
        let err = assembler(executor)
            .with_config(config)
            .compile(FetchRequest::new("articles", params))
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::SqlBuilder(SqlBuilderError::QueryTooComplex(_))
        ));
    }

    #[test]
    fn test_fetch_paths() {
        init_tracing();
        let executor = Arc::new(RecordingExecutor::default());
        let config = QueryConfig {
            pagination: Some(PageRequest::numbered(5, 1)),
            ..QueryConfig::default()
        };
        let assembler = assembler(Arc::clone(&executor)).with_config(config);

        block_on(async {
            // default pagination for collections
            let outcome = assembler
                .fetch_with_params(FetchRequest::new("articles", QueryParams::new()))
                .await
                .unwrap();
            match outcome {
                FetchOutcome::Page(page) => assert_eq!(
                    page.pagination,
                    Some(PageRequest::numbered(5, 1).meta(11))
                ),
                other => panic!("expected a page, got {other:?}"),
            }

            // explicit page wins over the default
            let outcome = assembler
                .fetch_with_params(FetchRequest::new(
                    "articles",
                    QueryParams::new().with_page(PageRequest::offset(2, 4)),
                ))
                .await
                .unwrap();
            assert_eq!(outcome.rows().len(), 1);

            // single fetches are never paginated
            let outcome = assembler
                .fetch_with_params(
                    FetchRequest::new("articles", QueryParams::new().with_page(PageRequest::offset(2, 4)))
                        .single(),
                )
                .await
                .unwrap();
            assert_eq!(outcome, FetchOutcome::One(Some(json!({"id": 1}))));
        });

        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        match &calls[0] {
            Call::Page(query, page) => {
                assert_eq!(*page, PageRequest::numbered(5, 1));
                assert!(query.query.sql.ends_with("LIMIT 5"));
                assert!(!query.count_query.sql.contains("LIMIT"));
            }
            other => panic!("unexpected call {other:?}"),
        }
        match &calls[1] {
            Call::Page(query, page) => {
                assert_eq!(*page, PageRequest::offset(2, 4));
                assert!(query.query.sql.ends_with("LIMIT 2 OFFSET 4"));
            }
            other => panic!("unexpected call {other:?}"),
        }
        match &calls[2] {
            Call::One(query) => assert_eq!(query.query.sql, "SELECT * FROM \"articles\""),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn test_fetch_all_without_pagination() {
        let executor = Arc::new(RecordingExecutor::default());
        let assembler = assembler(Arc::clone(&executor));
        let outcome = block_on(assembler.fetch_with_params(FetchRequest::new("articles", QueryParams::new())))
            .unwrap();
        assert_eq!(outcome.rows().len(), 2);
        assert!(matches!(executor.calls()[0], Call::All(_)));
    }

    #[test]
    fn test_storage_errors_propagate() {
        let executor = Arc::new(RecordingExecutor {
            fail: true,
            ..RecordingExecutor::default()
        });
        let err = block_on(
            assembler(executor).fetch_with_params(FetchRequest::new("articles", QueryParams::new())),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Storage(StorageError::ConnectionError { .. })
        ));
        assert!(!err.is_client_error());
        match err {
            QueryError::Storage(storage) => {
                assert_eq!(storage.category(), ErrorCategory::Infrastructure);
                assert!(storage.is_transient());
            }
            other => panic!("expected a storage error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejected_parameters_never_reach_executor() {
        init_tracing();
        let executor = Arc::new(RecordingExecutor::default());
        let assembler = QueryAssembler::new(Arc::new(blog_registry()), executor.clone())
            .with_config(QueryConfig {
                strict_paths: true,
                ..QueryConfig::default()
            });

        let err = block_on(assembler.fetch_with_params(FetchRequest::new(
            "articles",
            QueryParams::new().with_sort(["editor.name"]),
        )))
        .unwrap_err();
        assert!(err.is_client_error());
        assert!(executor.calls().is_empty());
    }
}
