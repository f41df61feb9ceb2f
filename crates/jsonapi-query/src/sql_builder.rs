//! SQL builder for the relational query assembled from JSON:API parameters.
//!
//! [`QueryBuilder`] is the single mutable handle every compiler stage writes
//! into: projections, joins, predicates, grouping, ordering and eager loads.
//! It renders to PostgreSQL with numbered `$N` placeholders.
//!
//! ## Features
//!
//! - **Parameterized queries**: all values go through bind parameters
//! - **Quoted identifiers**: table, alias and column names are always quoted
//! - **Raw fragments**: `?` placeholders, renumbered when rendered
//! - **Complexity guards**: maximum number of JOINs and conditions

use std::fmt;
use thiserror::Error;

use jsonapi_storage::{BuiltQuery, EagerLoad, PageRequest, SqlValue};

/// Errors that can occur during SQL building.
#[derive(Debug, Error)]
pub enum SqlBuilderError {
    #[error("Query too complex: {0}")]
    QueryTooComplex(String),

    #[error("Fragment '{sql}' has {placeholders} placeholders but {params} parameters")]
    PlaceholderMismatch {
        sql: String,
        placeholders: usize,
        params: usize,
    },
}

/// Default maximum number of conditions
pub const DEFAULT_MAX_CONDITIONS: usize = 100;

/// Default maximum number of JOINs
pub const DEFAULT_MAX_JOINS: usize = 16;

/// Quote a PostgreSQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// Building blocks
// ============================================================================

/// A possibly table-qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    pub fn bare(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// All columns of a table, `"table".*`.
    pub fn all(table: impl Into<String>) -> Self {
        Self::new(table, "*")
    }

    /// Parse `table.column` (or a bare `column`).
    pub fn parse(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((table, column)) => Self::new(table, column),
            None => Self::bare(qualified),
        }
    }

    pub fn to_sql(&self) -> String {
        let column = if self.column == "*" {
            "*".to_string()
        } else {
            quote_identifier(&self.column)
        };
        match &self.table {
            Some(table) => format!("{}.{column}", quote_identifier(table)),
            None => column,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// A raw SQL fragment with `?` placeholders, one per parameter.
///
/// Question marks inside quoted identifiers and string literals are not
/// placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Wrap the fragment's SQL, keeping its parameters.
    #[must_use]
    pub fn map_sql(mut self, f: impl FnOnce(&str) -> String) -> Self {
        self.sql = f(&self.sql);
        self
    }

    /// Append trailing parameters with their placeholders already in `sql`.
    #[must_use]
    pub fn with_params(mut self, sql: &str, params: impl IntoIterator<Item = SqlValue>) -> Self {
        self.sql.push_str(sql);
        self.params.extend(params);
        self
    }
}

/// Comparison operators for scalar conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Less than (<)
    Lt,
    /// Greater than or equal (>=)
    Ge,
    /// Less than or equal (<=)
    Le,
}

impl Operator {
    /// Get the SQL operator string.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

/// A WHERE condition that can be combined with other conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Simple comparison: column op value
    Compare {
        column: ColumnRef,
        op: Operator,
        value: SqlValue,
    },

    /// Membership test: column IN (values)
    In {
        column: ColumnRef,
        values: Vec<SqlValue>,
    },

    /// Exclusion test: column NOT IN (values)
    NotIn {
        column: ColumnRef,
        values: Vec<SqlValue>,
    },

    IsNull(ColumnRef),

    IsNotNull(ColumnRef),

    /// Case-insensitive match: LOWER(column::text) LIKE LOWER(pattern)
    Like { column: ColumnRef, pattern: String },

    /// Raw SQL condition with parameters
    Raw(Fragment),

    /// Combine conditions with OR
    Or(Vec<Condition>),

    /// Combine conditions with AND
    And(Vec<Condition>),

    /// Negation of a condition
    Not(Box<Condition>),

    /// Always true (used for empty AND lists)
    True,

    /// Always false (used for empty OR lists)
    False,
}

impl Condition {
    /// Create an OR condition.
    pub fn or(mut conditions: Vec<Condition>) -> Self {
        match conditions.len() {
            0 => Self::False,
            1 => conditions.remove(0),
            _ => Self::Or(conditions),
        }
    }

    /// Create an AND condition.
    pub fn and(mut conditions: Vec<Condition>) -> Self {
        match conditions.len() {
            0 => Self::True,
            1 => conditions.remove(0),
            _ => Self::And(conditions),
        }
    }

    /// Create a NOT condition.
    pub fn negate(condition: Condition) -> Self {
        Self::Not(Box::new(condition))
    }

    /// Create a raw SQL condition.
    pub fn raw(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self::Raw(Fragment::new(sql, params))
    }

    /// Number of leaf predicates in this condition tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Or(conditions) | Self::And(conditions) => {
                conditions.iter().map(Self::leaf_count).sum()
            }
            Self::Not(condition) => condition.leaf_count(),
            _ => 1,
        }
    }
}

/// Aggregate functions allowed in sparse fieldsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Column(ColumnRef),
    /// `fn(column) AS alias`
    Aggregate {
        function: AggregateFunction,
        column: ColumnRef,
        alias: String,
    },
    /// Expression with parameters, alias included in the fragment
    Expression(Fragment),
}

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One entry of the ORDER BY list.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTerm {
    Column { column: ColumnRef, order: SortOrder },
    Expression { fragment: Fragment, order: SortOrder },
}

/// One entry of the GROUP BY list.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupTerm {
    Column(ColumnRef),
    Expression(Fragment),
}

/// One `ON` predicate of a join.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// `left = right`
    Columns(ColumnRef, ColumnRef),
    /// `column = $n`
    Value(ColumnRef, SqlValue),
}

/// A LEFT OUTER JOIN of `table AS alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: Vec<JoinCondition>,
}

impl Join {
    pub fn left(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            on: Vec::new(),
        }
    }

    #[must_use]
    pub fn on(mut self, left: ColumnRef, right: ColumnRef) -> Self {
        self.on.push(JoinCondition::Columns(left, right));
        self
    }

    #[must_use]
    pub fn on_value(mut self, column: ColumnRef, value: SqlValue) -> Self {
        self.on.push(JoinCondition::Value(column, value));
        self
    }
}

// ============================================================================
// Query Builder
// ============================================================================

/// Mutable builder accumulating one relational query.
///
/// # Example
///
/// ```ignore
/// let mut qb = QueryBuilder::new("articles", "articles");
/// qb.join(Join::left("people", "author").on(
///     ColumnRef::new("articles", "author_id"),
///     ColumnRef::new("author", "id"),
/// ));
/// qb.where_condition(Condition::In {
///     column: ColumnRef::new("author", "name"),
///     values: vec!["Ann".into()],
/// });
/// let built = qb.build()?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    alias: String,
    schema: Option<String>,
    distinct: bool,
    projections: Vec<Projection>,
    joins: Vec<Join>,
    conditions: Vec<Condition>,
    group_by: Vec<GroupTerm>,
    order_by: Vec<OrderTerm>,
    with_related: Vec<EagerLoad>,
    limit: Option<u64>,
    offset: Option<u64>,
    max_joins: usize,
    max_conditions: usize,
}

impl QueryBuilder {
    /// Create a builder selecting from `table`, referenced as `alias`.
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            schema: None,
            distinct: false,
            projections: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            with_related: Vec::new(),
            limit: None,
            offset: None,
            max_joins: DEFAULT_MAX_JOINS,
            max_conditions: DEFAULT_MAX_CONDITIONS,
        }
    }

    /// Qualify every table with a schema name.
    #[must_use]
    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Override the complexity limits.
    #[must_use]
    pub fn with_limits(mut self, max_joins: usize, max_conditions: usize) -> Self {
        self.max_joins = max_joins;
        self.max_conditions = max_conditions;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Add an entry to the SELECT list.
    pub fn select(&mut self, projection: Projection) {
        self.projections.push(projection);
    }

    pub fn select_column(&mut self, column: ColumnRef) {
        self.select(Projection::Column(column));
    }

    /// Make the query `SELECT DISTINCT`.
    pub fn distinct(&mut self) {
        self.distinct = true;
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// True if `column` is already a plain projection.
    pub fn selects_column(&self, column: &ColumnRef) -> bool {
        self.projections
            .iter()
            .any(|p| matches!(p, Projection::Column(c) if c == column))
    }

    /// Add a join unless its alias is already joined.
    ///
    /// Returns false if the alias was already present.
    pub fn join(&mut self, join: Join) -> bool {
        if self.has_join(&join.alias) {
            return false;
        }
        self.joins.push(join);
        true
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Add a search condition (AND semantics with the others).
    pub fn where_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn group_by(&mut self, term: GroupTerm) {
        self.group_by.push(term);
    }

    pub fn group_terms(&self) -> &[GroupTerm] {
        &self.group_by
    }

    pub fn order_by(&mut self, column: ColumnRef, order: SortOrder) {
        self.order_by.push(OrderTerm::Column { column, order });
    }

    pub fn order_by_expression(&mut self, fragment: Fragment, order: SortOrder) {
        self.order_by.push(OrderTerm::Expression { fragment, order });
    }

    pub fn order_terms(&self) -> &[OrderTerm] {
        &self.order_by
    }

    /// Request a relation to be loaded alongside the main rows.
    pub fn with_related(&mut self, load: EagerLoad) {
        self.with_related.push(load);
    }

    pub fn eager_loads(&self) -> &[EagerLoad] {
        &self.with_related
    }

    /// Set LIMIT and OFFSET.
    pub fn paginate(&mut self, limit: u64, offset: u64) {
        self.limit = Some(limit);
        self.offset = Some(offset);
    }

    /// Validate the query complexity.
    fn validate(&self) -> Result<(), SqlBuilderError> {
        let condition_count: usize = self.conditions.iter().map(Condition::leaf_count).sum();
        if condition_count > self.max_conditions {
            return Err(SqlBuilderError::QueryTooComplex(format!(
                "Too many conditions: {} (max {})",
                condition_count, self.max_conditions
            )));
        }

        if self.joins.len() > self.max_joins {
            return Err(SqlBuilderError::QueryTooComplex(format!(
                "Too many JOINs: {} (max {})",
                self.joins.len(),
                self.max_joins
            )));
        }

        Ok(())
    }

    /// Build the SQL query and parameters.
    pub fn build(&self) -> Result<BuiltQuery, SqlBuilderError> {
        self.validate()?;

        let mut writer = SqlWriter::default();
        let mut sql = self.render_select(&mut writer)?;

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|term| match term {
                    OrderTerm::Column { column, order } => {
                        Ok(format!("{} {}", column.to_sql(), order.as_sql()))
                    }
                    OrderTerm::Expression { fragment, order } => {
                        Ok(format!("{} {}", writer.fragment(fragment)?, order.as_sql()))
                    }
                })
                .collect::<Result<Vec<_>, SqlBuilderError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(writer.finish(sql))
    }

    /// Build the query for one page of results.
    pub fn build_page(&self, page: &PageRequest) -> Result<BuiltQuery, SqlBuilderError> {
        let (limit, offset) = page.limit_offset();
        let mut paged = self.clone();
        paged.paginate(limit, offset);
        paged.build()
    }

    /// Build a COUNT query over the same filtered and joined rows.
    ///
    /// Grouped or DISTINCT queries are counted through a subquery so that the
    /// count matches the number of returned rows.
    pub fn build_count(&self) -> Result<BuiltQuery, SqlBuilderError> {
        self.validate()?;

        let mut writer = SqlWriter::default();
        let sql = if self.distinct || !self.group_by.is_empty() {
            let inner = self.render_select(&mut writer)?;
            format!("SELECT COUNT(*) AS total FROM ({inner}) AS counted")
        } else {
            let mut sql = format!("SELECT COUNT(*) AS total FROM {}", self.render_from(&mut writer));
            if let Some(where_sql) = self.render_where(&mut writer)? {
                sql.push_str(" WHERE ");
                sql.push_str(&where_sql);
            }
            sql
        };

        Ok(writer.finish(sql))
    }

    /// SELECT ... FROM ... JOIN ... WHERE ... GROUP BY ...
    fn render_select(&self, writer: &mut SqlWriter) -> Result<String, SqlBuilderError> {
        let select_list = if self.projections.is_empty() {
            "*".to_string()
        } else {
            self.projections
                .iter()
                .map(|p| match p {
                    Projection::Column(column) => Ok(column.to_sql()),
                    Projection::Aggregate {
                        function,
                        column,
                        alias,
                    } => Ok(format!(
                        "{}({}) AS {}",
                        function.as_str(),
                        column.to_sql(),
                        quote_identifier(alias)
                    )),
                    Projection::Expression(fragment) => writer.fragment(fragment),
                })
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };

        let distinct = if self.distinct { "DISTINCT " } else { "" };
        let mut sql = format!(
            "SELECT {distinct}{select_list} FROM {}",
            self.render_from(writer)
        );

        if let Some(where_sql) = self.render_where(writer)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if !self.group_by.is_empty() {
            let terms = self
                .group_by
                .iter()
                .map(|term| match term {
                    GroupTerm::Column(column) => Ok(column.to_sql()),
                    GroupTerm::Expression(fragment) => writer.fragment(fragment),
                })
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&terms.join(", "));
        }

        Ok(sql)
    }

    fn table_sql(&self, table: &str, alias: &str) -> String {
        let qualified = match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(table)),
            None => quote_identifier(table),
        };
        if table == alias {
            qualified
        } else {
            format!("{qualified} AS {}", quote_identifier(alias))
        }
    }

    fn render_from(&self, writer: &mut SqlWriter) -> String {
        let mut from = self.table_sql(&self.table, &self.alias);

        for join in &self.joins {
            let on = join
                .on
                .iter()
                .map(|condition| match condition {
                    JoinCondition::Columns(left, right) => {
                        format!("{} = {}", left.to_sql(), right.to_sql())
                    }
                    JoinCondition::Value(column, value) => {
                        format!("{} = {}", column.to_sql(), writer.bind(value.clone()))
                    }
                })
                .collect::<Vec<_>>()
                .join(" AND ");

            from.push_str(&format!(
                " LEFT OUTER JOIN {} ON {on}",
                self.table_sql(&join.table, &join.alias)
            ));
        }

        from
    }

    fn render_where(&self, writer: &mut SqlWriter) -> Result<Option<String>, SqlBuilderError> {
        if self.conditions.is_empty() {
            return Ok(None);
        }

        let condition_sqls = self
            .conditions
            .iter()
            .map(|c| writer.condition(c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(condition_sqls.join(" AND ")))
    }
}

/// Accumulates bind parameters while SQL text is rendered left to right.
#[derive(Debug, Default)]
struct SqlWriter {
    params: Vec<SqlValue>,
}

impl SqlWriter {
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn bind_list(&mut self, values: &[SqlValue]) -> String {
        values
            .iter()
            .map(|v| self.bind(v.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Replace each `?` outside quotes with the next numbered placeholder.
    fn fragment(&mut self, fragment: &Fragment) -> Result<String, SqlBuilderError> {
        let mut out = String::with_capacity(fragment.sql.len() + 8);
        let mut params = fragment.params.iter();
        let mut placeholders = 0;
        let mut in_identifier = false;
        let mut in_literal = false;

        for c in fragment.sql.chars() {
            match c {
                '"' if !in_literal => in_identifier = !in_identifier,
                '\'' if !in_identifier => in_literal = !in_literal,
                '?' if !in_identifier && !in_literal => {
                    placeholders += 1;
                    match params.next() {
                        Some(value) => out.push_str(&self.bind(value.clone())),
                        None => {
                            return Err(SqlBuilderError::PlaceholderMismatch {
                                sql: fragment.sql.clone(),
                                placeholders,
                                params: fragment.params.len(),
                            });
                        }
                    }
                    continue;
                }
                _ => {}
            }
            out.push(c);
        }

        if placeholders != fragment.params.len() {
            return Err(SqlBuilderError::PlaceholderMismatch {
                sql: fragment.sql.clone(),
                placeholders,
                params: fragment.params.len(),
            });
        }

        Ok(out)
    }

    fn condition(&mut self, condition: &Condition) -> Result<String, SqlBuilderError> {
        match condition {
            Condition::Compare { column, op, value } => Ok(format!(
                "{} {} {}",
                column.to_sql(),
                op.as_sql(),
                self.bind(value.clone())
            )),

            Condition::In { column, values } => {
                if values.is_empty() {
                    return Ok("FALSE".to_string());
                }
                Ok(format!("{} IN ({})", column.to_sql(), self.bind_list(values)))
            }

            Condition::NotIn { column, values } => {
                if values.is_empty() {
                    return Ok("TRUE".to_string());
                }
                Ok(format!(
                    "{} NOT IN ({})",
                    column.to_sql(),
                    self.bind_list(values)
                ))
            }

            Condition::IsNull(column) => Ok(format!("{} IS NULL", column.to_sql())),

            Condition::IsNotNull(column) => Ok(format!("{} IS NOT NULL", column.to_sql())),

            Condition::Like { column, pattern } => Ok(format!(
                "LOWER({}::text) LIKE LOWER({})",
                column.to_sql(),
                self.bind(SqlValue::Text(pattern.clone()))
            )),

            Condition::Raw(fragment) => self.fragment(fragment),

            Condition::Or(conditions) => {
                if conditions.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let parts = conditions
                    .iter()
                    .map(|c| self.condition(c))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" OR ")))
            }

            Condition::And(conditions) => {
                if conditions.is_empty() {
                    return Ok("TRUE".to_string());
                }
                let parts = conditions
                    .iter()
                    .map(|c| self.condition(c))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }

            Condition::Not(condition) => {
                let inner = self.condition(condition)?;
                Ok(format!("(NOT {inner})"))
            }

            Condition::True => Ok("TRUE".to_string()),
            Condition::False => Ok("FALSE".to_string()),
        }
    }

    fn finish(self, sql: String) -> BuiltQuery {
        BuiltQuery {
            sql,
            params: self.params,
        }
    }
}
