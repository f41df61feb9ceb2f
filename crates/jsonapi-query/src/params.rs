//! JSON:API query parameters.
//!
//! [`QueryParams`] is the decoded form of `include`, `fields`, `sort`,
//! `filter`, `group` and `page`. It can be deserialized from a JSON object
//! (clause order preserved) or produced by [`crate::parser::parse_query_string`].

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

use jsonapi_storage::PageRequest;

/// Decoded JSON:API query parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Relation paths to eager load
    #[serde(deserialize_with = "string_list")]
    pub include: Vec<String>,
    /// Sparse fieldsets keyed by type name or relation path
    #[serde(deserialize_with = "fieldsets")]
    pub fields: IndexMap<String, Vec<String>>,
    /// Sort keys, `-` or `_` prefix for descending
    #[serde(deserialize_with = "string_list")]
    pub sort: Vec<String>,
    pub filter: Filter,
    #[serde(deserialize_with = "string_list")]
    pub group: Vec<String>,
    pub page: Option<PageRequest>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_include<I, S>(mut self, include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(include.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_fields<I, S>(mut self, key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .entry(key.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_sort<I, S>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort.extend(sort.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_group<I, S>(mut self, group: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group.extend(group.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Typed filter operators, nested under their name in a filter object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Like,
    Not,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 6] = [
        Self::Like,
        Self::Not,
        Self::Lt,
        Self::Gt,
        Self::Lte,
        Self::Gte,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(Self::Like),
            "not" => Some(Self::Not),
            "lt" => Some(Self::Lt),
            "gt" => Some(Self::Gt),
            "lte" => Some(Self::Lte),
            "gte" => Some(Self::Gte),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Not => "not",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Lte => "lte",
            Self::Gte => "gte",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter value.
///
/// Numbers and booleans are kept in their textual form; the database casts
/// them on comparison.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum FilterValue {
    Null,
    Single(String),
    Many(Vec<Option<String>>),
}

impl FilterValue {
    pub fn single(value: impl Into<String>) -> Self {
        Self::Single(value.into())
    }

    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self::Many(values.into_iter().map(|v| v.map(Into::into)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Candidate values; a single string is split on commas.
    pub fn values(&self) -> Vec<Option<String>> {
        match self {
            Self::Null => vec![None],
            Self::Single(s) => s.split(',').map(|v| Some(v.to_string())).collect(),
            Self::Many(values) => values.clone(),
        }
    }

    /// The value for single-valued comparisons. Strings are not split.
    pub fn scalar(&self) -> Option<&str> {
        match self {
            Self::Null => None,
            Self::Single(s) => Some(s),
            Self::Many(values) => values.iter().flatten().next().map(String::as_str),
        }
    }
}

impl TryFrom<Value> for FilterValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        fn scalar(value: Value) -> Result<Option<String>, String> {
            match value {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(s)),
                Value::Number(n) => Ok(Some(n.to_string())),
                Value::Bool(b) => Ok(Some(b.to_string())),
                other => Err(format!("unsupported filter value: {other}")),
            }
        }

        match value {
            Value::Array(items) => items
                .into_iter()
                .map(scalar)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Many),
            other => Ok(scalar(other)?.map_or(Self::Null, Self::Single)),
        }
    }
}

/// One entry of a filter object, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterClause {
    /// `filter[key]=value`
    Equality { key: String, value: FilterValue },
    /// `filter[op][key]=value`
    Typed {
        operator: FilterOperator,
        entries: IndexMap<String, FilterValue>,
    },
}

/// Ordered collection of filter clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<FilterClause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause.
    #[must_use]
    pub fn with_equality(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.push_equality(key, value);
        self
    }

    /// Add a typed clause, grouped with earlier clauses of the same operator.
    #[must_use]
    pub fn with_typed(
        mut self,
        operator: FilterOperator,
        key: impl Into<String>,
        value: FilterValue,
    ) -> Self {
        self.push_typed(operator, key, value);
        self
    }

    /// Add an equality clause. A repeated key widens the existing clause
    /// to the union of both value lists.
    pub fn push_equality(&mut self, key: impl Into<String>, value: FilterValue) {
        let key = key.into();
        let existing = self.clauses.iter_mut().find_map(|clause| match clause {
            FilterClause::Equality { key: k, value } if *k == key => Some(value),
            _ => None,
        });

        match existing {
            Some(current) => {
                let mut values = current.values();
                values.extend(value.values());
                *current = FilterValue::Many(values);
            }
            None => self.clauses.push(FilterClause::Equality { key, value }),
        }
    }

    pub fn push_typed(&mut self, operator: FilterOperator, key: impl Into<String>, value: FilterValue) {
        let existing = self.clauses.iter_mut().find_map(|clause| match clause {
            FilterClause::Typed {
                operator: op,
                entries,
            } if *op == operator => Some(entries),
            _ => None,
        });

        match existing {
            Some(entries) => {
                entries.insert(key.into(), value);
            }
            None => {
                let mut entries = IndexMap::new();
                entries.insert(key.into(), value);
                self.clauses.push(FilterClause::Typed { operator, entries });
            }
        }
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Value of the equality clause for `key`, if any.
    pub fn equality(&self, key: &str) -> Option<&FilterValue> {
        self.clauses.iter().find_map(|clause| match clause {
            FilterClause::Equality { key: k, value } if k == key => Some(value),
            _ => None,
        })
    }

    /// Value of `key` under a typed operator, if any.
    pub fn typed(&self, operator: FilterOperator, key: &str) -> Option<&FilterValue> {
        self.clauses.iter().find_map(|clause| match clause {
            FilterClause::Typed {
                operator: op,
                entries,
            } if *op == operator => entries.get(key),
            _ => None,
        })
    }

    /// Every attribute key referenced by the filter, in clause order.
    pub fn keys(&self) -> Vec<&str> {
        self.clauses
            .iter()
            .flat_map(|clause| match clause {
                FilterClause::Equality { key, .. } => vec![key.as_str()],
                FilterClause::Typed { entries, .. } => entries.keys().map(String::as_str).collect(),
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawEntry {
            Value(FilterValue),
            Nested(IndexMap<String, FilterValue>),
        }

        let raw = IndexMap::<String, RawEntry>::deserialize(deserializer)?;
        let mut filter = Filter::new();

        for (key, entry) in raw {
            match (FilterOperator::parse(&key), entry) {
                (Some(operator), RawEntry::Nested(entries)) => {
                    for (column, value) in entries {
                        filter.push_typed(operator, column, value);
                    }
                }
                (_, RawEntry::Value(value)) => filter.push_equality(key, value),
                (None, RawEntry::Nested(_)) => {
                    tracing::debug!(key = %key, "Ignoring nested filter under a non-operator key");
                }
            }
        }

        Ok(filter)
    }
}

// ============================================================================
// List deserialization helpers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => split_list(&s),
            Self::Many(items) => items,
        }
    }
}

/// Split a comma-separated list, dropping empty entries.
pub(crate) fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrList>::deserialize(deserializer)?
        .map(StringOrList::into_vec)
        .unwrap_or_default())
}

fn fieldsets<'de, D>(deserializer: D) -> Result<IndexMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IndexMap<String, StringOrList>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, list)| (key, list.into_vec()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_params() {
        let params: QueryParams = serde_json::from_value(json!({
            "include": "author,comments",
            "fields": { "articles": "title,body", "author": ["name"] },
            "sort": ["-created_at"],
            "page": { "size": 10, "number": 2 }
        }))
        .unwrap();

        assert_eq!(params.include, vec!["author", "comments"]);
        assert_eq!(params.fields["articles"], vec!["title", "body"]);
        assert_eq!(params.fields["author"], vec!["name"]);
        assert_eq!(params.sort, vec!["-created_at"]);
        assert_eq!(params.page, Some(PageRequest::numbered(10, 2)));
        assert!(params.filter.is_empty());
    }

    #[test]
    fn test_filter_preserves_clause_order() {
        let params: QueryParams = serde_json::from_str(
            r#"{"filter": {"title": "a", "like": {"body": "x", "author.name": "y"}, "id": [1, null]}}"#,
        )
        .unwrap();

        let clauses = params.filter.clauses();
        assert_eq!(clauses.len(), 3);
        assert!(matches!(&clauses[0], FilterClause::Equality { key, .. } if key == "title"));
        match &clauses[1] {
            FilterClause::Typed { operator, entries } => {
                assert_eq!(*operator, FilterOperator::Like);
                assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["body", "author.name"]);
            }
            other => panic!("unexpected clause {other:?}"),
        }
        assert_eq!(
            params.filter.equality("id"),
            Some(&FilterValue::Many(vec![Some("1".into()), None]))
        );
        assert_eq!(params.filter.keys(), vec!["title", "body", "author.name", "id"]);
    }

    #[test]
    fn test_filter_value_forms() {
        assert_eq!(FilterValue::Null.values(), vec![None]);
        assert_eq!(
            FilterValue::single("a,b").values(),
            vec![Some("a".to_string()), Some("b".to_string())]
        );
        assert_eq!(FilterValue::single("a,b").scalar(), Some("a,b"));
        assert_eq!(FilterValue::many([None, Some("3")]).scalar(), Some("3"));
        assert_eq!(FilterValue::Null.scalar(), None);

        let value: FilterValue = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(value, FilterValue::single("true"));
        assert!(serde_json::from_value::<FilterValue>(json!({"a": 1})).is_err());
    }

    #[test]
    fn test_push_typed_groups_by_operator() {
        let filter = Filter::new()
            .with_typed(FilterOperator::Gt, "views", FilterValue::single("1"))
            .with_equality("title", FilterValue::single("x"))
            .with_typed(FilterOperator::Gt, "likes", FilterValue::single("2"));

        assert_eq!(filter.clauses().len(), 2);
        assert_eq!(
            filter.typed(FilterOperator::Gt, "likes"),
            Some(&FilterValue::single("2"))
        );
        assert_eq!(filter.typed(FilterOperator::Lt, "likes"), None);
    }

    #[test]
    fn test_repeated_equality_key_merges() {
        let filter = Filter::new()
            .with_equality("title", FilterValue::single("a"))
            .with_typed(FilterOperator::Like, "title", FilterValue::single("rust"))
            .with_equality("title", FilterValue::single("b,c"))
            .with_equality("status", FilterValue::Null);

        assert_eq!(filter.clauses().len(), 3);
        assert_eq!(
            filter.equality("title"),
            Some(&FilterValue::many([Some("a"), Some("b"), Some("c")]))
        );
        assert_eq!(filter.equality("status"), Some(&FilterValue::Null));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
