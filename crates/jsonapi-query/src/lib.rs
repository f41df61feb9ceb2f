//! # jsonapi-query
//!
//! Compiles JSON:API query parameters (`include`, `fields`, `sort`,
//! `filter`, `group`, `page`) into a relational query over a
//! [`jsonapi_core::TypeRegistry`], and fetches through a
//! [`jsonapi_storage::QueryExecutor`].
//!
//! ```ignore
//! let params = parse_query_string("include=author&filter[like][title]=rust&sort=-createdAt")?;
//! let assembler = QueryAssembler::new(registry, executor).with_config(config);
//! let outcome = assembler
//!     .fetch_with_params(FetchRequest::new("articles", params))
//!     .await?;
//! ```

pub mod config;
pub mod context;
pub mod dependencies;
pub mod engine;
pub mod error;
pub mod fields;
pub mod filter;
pub mod formatter;
pub mod group;
pub mod include;
pub mod joins;
pub mod jsonb;
pub mod params;
pub mod parser;
pub mod resolver;
pub mod sort;
pub mod sql_builder;

pub use config::{ConfigError, QueryConfig};
pub use context::{AttributeTarget, CompilationContext};
pub use dependencies::DependencyTree;
pub use engine::{ExtraQuery, FetchRequest, PreparedQuery, QueryAssembler};
pub use error::{QueryError, QueryResult};
pub use formatter::ColumnFormatter;
pub use jsonb::{JsonbAttribute, JsonbCast, JsonbFilter};
pub use params::{Filter, FilterClause, FilterOperator, FilterValue, QueryParams};
pub use parser::{QueryStringError, QueryStringParser, parse_query_string};
pub use resolver::{PathError, RelationHop, ResolvedPath};
pub use sql_builder::{
    ColumnRef, Condition, Fragment, Join, Operator, Projection, QueryBuilder, SortOrder,
    SqlBuilderError,
};
