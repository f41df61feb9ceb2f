//! JSONB sub-attribute compilation.
//!
//! An attribute key of the form `column:json.path[:type]` addresses a value
//! inside a JSONB column. The extracted value is `column #>> '{json,path}'`,
//! optionally cast to one of the allowed types. Path elements are always
//! bound as a `text[]` parameter, never spliced into the SQL.

use jsonapi_storage::SqlValue;

use crate::params::FilterOperator;
use crate::sql_builder::{ColumnRef, Condition, Fragment, Projection, QueryBuilder, SortOrder, quote_identifier};

/// Casts allowed on an extracted JSONB value. Anything else means no cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonbCast {
    Numeric,
    Date,
    Timestamp,
}

impl JsonbCast {
    pub fn parse(data_type: &str) -> Option<Self> {
        match data_type {
            "numeric" => Some(Self::Numeric),
            "date" => Some(Self::Date),
            "timestamp" => Some(Self::Timestamp),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }
}

/// Filter kinds applicable to a JSONB sub-attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonbFilter {
    Equal,
    Like,
    Not,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl JsonbFilter {
    pub fn parse(filter_type: &str) -> Option<Self> {
        match filter_type {
            "equal" => Some(Self::Equal),
            other => FilterOperator::parse(other).map(Self::from),
        }
    }
}

impl From<FilterOperator> for JsonbFilter {
    fn from(operator: FilterOperator) -> Self {
        match operator {
            FilterOperator::Like => Self::Like,
            FilterOperator::Not => Self::Not,
            FilterOperator::Lt => Self::Lt,
            FilterOperator::Lte => Self::Lte,
            FilterOperator::Gt => Self::Gt,
            FilterOperator::Gte => Self::Gte,
        }
    }
}

/// A value inside a JSONB column.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonbAttribute {
    pub column: ColumnRef,
    pub path: Vec<String>,
    pub cast: Option<JsonbCast>,
}

impl JsonbAttribute {
    /// `json_path` is dotted; `data_type` outside the allowed casts is ignored.
    pub fn new(column: ColumnRef, json_path: &str, data_type: Option<&str>) -> Self {
        Self {
            column,
            path: json_path.split('.').map(str::to_string).collect(),
            cast: data_type.and_then(JsonbCast::parse),
        }
    }

    /// Last path element, used as the projection alias.
    pub fn leaf(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// The extraction expression, with the path as its one parameter.
    pub fn expression(&self) -> Fragment {
        let extract = format!("({} #>> ?)", self.column.to_sql());
        let sql = match self.cast {
            Some(cast) => format!("{extract}::{}", cast.as_sql()),
            None => extract,
        };
        Fragment::new(sql, vec![SqlValue::TextArray(self.path.clone())])
    }

    /// The extraction expression aliased by the leaf name.
    pub fn aliased_expression(&self) -> Fragment {
        let alias = quote_identifier(self.leaf());
        self.expression().map_sql(|sql| format!("{sql} AS {alias}"))
    }
}

/// Split out `null` and `"null"` entries. Returns the remaining values and
/// whether any null was present.
fn pull_nulls(values: Vec<Option<String>>) -> (Vec<String>, bool) {
    let mut has_null = false;
    let mut rest = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Some(v) if v != "null" => rest.push(v),
            _ => has_null = true,
        }
    }
    (rest, has_null)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn membership(attribute: &JsonbAttribute, values: &[String], negated: bool) -> Condition {
    let keyword = if negated { "NOT IN" } else { "IN" };
    Condition::Raw(attribute.expression().with_params(
        &format!(" {keyword} ({})", placeholders(values.len())),
        values.iter().cloned().map(SqlValue::Text),
    ))
}

fn equality(attribute: &JsonbAttribute, values: Vec<Option<String>>) -> Condition {
    let (values, has_null) = pull_nulls(values);
    let is_null = || Condition::Raw(attribute.expression().map_sql(|sql| format!("{sql} IS NULL")));

    match (has_null, values.is_empty()) {
        (true, true) => is_null(),
        (true, false) => Condition::or(vec![is_null(), membership(attribute, &values, false)]),
        (false, true) => Condition::False,
        (false, false) => membership(attribute, &values, false),
    }
}

fn comparison(attribute: &JsonbAttribute, op: &str, value: String) -> Condition {
    Condition::Raw(
        attribute
            .expression()
            .with_params(&format!(" {op} ?"), [SqlValue::Text(value)]),
    )
}

/// Conditions for one JSONB filter.
///
/// Nulls (and the string `null`) in `values` mean SQL NULL. For `like`,
/// `extra_equality` holds equality values on the same key, which are folded
/// into the OR group. Range filters use the first non-null value.
pub fn filter_conditions(
    filter: JsonbFilter,
    values: Vec<Option<String>>,
    attribute: &JsonbAttribute,
    extra_equality: Option<Vec<Option<String>>>,
) -> Vec<Condition> {
    match filter {
        JsonbFilter::Equal => vec![equality(attribute, values)],

        JsonbFilter::Like => {
            let (values, _) = pull_nulls(values);
            let mut group: Vec<Condition> = values
                .into_iter()
                .map(|value| {
                    Condition::Raw(
                        attribute
                            .expression()
                            .map_sql(|sql| format!("LOWER(({sql})::text) LIKE LOWER(?)"))
                            .with_params("", [SqlValue::Text(format!("%{value}%"))]),
                    )
                })
                .collect();
            if let Some(extra) = extra_equality {
                group.push(equality(attribute, extra));
            }
            if group.is_empty() {
                Vec::new()
            } else {
                vec![Condition::or(group)]
            }
        }

        JsonbFilter::Not => {
            let (values, has_null) = pull_nulls(values);
            let mut conditions = Vec::new();
            if has_null {
                conditions.push(Condition::Raw(
                    attribute.expression().map_sql(|sql| format!("{sql} IS NOT NULL")),
                ));
            }
            if !values.is_empty() {
                conditions.push(membership(attribute, &values, true));
            }
            conditions
        }

        JsonbFilter::Lt | JsonbFilter::Lte | JsonbFilter::Gt | JsonbFilter::Gte => {
            let op = match filter {
                JsonbFilter::Lt => "<",
                JsonbFilter::Lte => "<=",
                JsonbFilter::Gt => ">",
                _ => ">=",
            };
            let (values, _) = pull_nulls(values);
            values
                .into_iter()
                .next()
                .map(|value| comparison(attribute, op, value))
                .into_iter()
                .collect()
        }
    }
}

/// Add the predicates of a JSONB filter to the query.
pub fn build_filter_with_type(
    qb: &mut QueryBuilder,
    filter: JsonbFilter,
    values: Vec<Option<String>>,
    attribute: &JsonbAttribute,
    extra_equality: Option<Vec<Option<String>>>,
) {
    for condition in filter_conditions(filter, values, attribute, extra_equality) {
        qb.where_condition(condition);
    }
}

/// Project the sub-attribute, aliased by its leaf name.
pub fn build_select(qb: &mut QueryBuilder, attribute: &JsonbAttribute) {
    qb.select(Projection::Expression(attribute.aliased_expression()));
}

/// Order by the sub-attribute. Only `desc` sorts descending; any other
/// direction sorts ascending.
pub fn build_sort(qb: &mut QueryBuilder, sort_type: &str, attribute: &JsonbAttribute) {
    let order = if sort_type == "desc" {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    };
    qb.order_by_expression(attribute.expression(), order);
}
