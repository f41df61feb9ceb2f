//! Types exchanged between the query compiler and execution backends.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// A result row as returned by a backend, usually a JSON object keyed by
/// column name.
pub type Row = Value;

/// SQL value types for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// A `text[]` parameter, used for JSONB path operands
    TextArray(Vec<String>),
}

impl SqlValue {
    /// Get the value as a string for display/debugging.
    pub fn as_display_str(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::TextArray(items) => format!("{{{}}}", items.join(",")),
            Self::Null => "NULL".to_string(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A built SQL query with `$N` placeholders and their parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl fmt::Display for BuiltQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// A relation to load alongside the main rows.
///
/// `columns` restricts the projection of the related rows; `None` loads every
/// column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerLoad {
    /// Dotted relation path, e.g. `author.country`
    pub relation: String,
    pub columns: Option<Vec<String>>,
}

impl EagerLoad {
    pub fn relation(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            columns: None,
        }
    }

    pub fn with_columns(relation: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            relation: relation.into(),
            columns: Some(columns),
        }
    }
}

/// A compiled query handed to a [`crate::QueryExecutor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// Resource type the rows belong to
    pub resource_type: String,
    /// The main query, without pagination
    pub query: BuiltQuery,
    /// `SELECT COUNT(*)` over the same filtered, joined set
    pub count_query: BuiltQuery,
    /// Relations to load for the returned rows
    pub with_related: Vec<EagerLoad>,
}

/// Pagination request, either page based or offset based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRequest {
    Numbered {
        #[serde(deserialize_with = "number_or_string")]
        size: u64,
        #[serde(default = "first_page", deserialize_with = "number_or_string")]
        number: u64,
    },
    Offset {
        #[serde(deserialize_with = "number_or_string")]
        limit: u64,
        #[serde(default, deserialize_with = "number_or_string")]
        offset: u64,
    },
}

/// Largest LIMIT or OFFSET the database accepts.
const MAX_WINDOW: u64 = i64::MAX as u64;

fn first_page() -> u64 {
    1
}

/// Page parameters arrive as strings when decoded from a query string.
fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl PageRequest {
    pub fn numbered(size: u64, number: u64) -> Self {
        Self::Numbered { size, number }
    }

    pub fn offset(limit: u64, offset: u64) -> Self {
        Self::Offset { limit, offset }
    }

    /// LIMIT and OFFSET equivalent to this request. Page numbers start at 1.
    ///
    /// Both values are capped at the largest `bigint`.
    pub fn limit_offset(&self) -> (u64, u64) {
        let (limit, offset) = match *self {
            Self::Numbered { size, number } => {
                (size, number.max(1).saturating_sub(1).saturating_mul(size))
            }
            Self::Offset { limit, offset } => (limit, offset),
        };
        (limit.min(MAX_WINDOW), offset.min(MAX_WINDOW))
    }

    /// Pagination metadata for a result set of `row_count` rows in total.
    pub fn meta(&self, row_count: u64) -> PaginationMeta {
        match *self {
            Self::Numbered { size, number } => PaginationMeta::Numbered {
                page: number.max(1),
                page_size: size,
                row_count,
                page_count: if size == 0 { 0 } else { row_count.div_ceil(size) },
            },
            Self::Offset { limit, offset } => PaginationMeta::Offset {
                limit,
                offset,
                row_count,
            },
        }
    }
}

/// Pagination metadata returned with a page of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaginationMeta {
    #[serde(rename_all = "camelCase")]
    Numbered {
        page: u64,
        page_size: u64,
        row_count: u64,
        page_count: u64,
    },
    #[serde(rename_all = "camelCase")]
    Offset {
        limit: u64,
        offset: u64,
        row_count: u64,
    },
}

/// A page of rows plus pagination metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub rows: Vec<Row>,
    pub pagination: Option<PaginationMeta>,
}

/// Result of a fetch: a single row, a collection, or a page.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    One(Option<Row>),
    Many(Vec<Row>),
    Page(Page),
}

impl FetchOutcome {
    /// All rows contained in this outcome.
    pub fn rows(&self) -> Vec<&Row> {
        match self {
            Self::One(row) => row.iter().collect(),
            Self::Many(rows) => rows.iter().collect(),
            Self::Page(page) => page.rows.iter().collect(),
        }
    }
}
