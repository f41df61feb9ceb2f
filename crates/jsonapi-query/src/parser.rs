//! Query string decoding.
//!
//! Turns `include=author&fields[articles]=title&filter[like][title]=rust&page[size]=10`
//! into [`QueryParams`]. Bracketed keys follow the JSON:API conventions.

use thiserror::Error;
use url::form_urlencoded;

use jsonapi_storage::PageRequest;

use crate::params::{FilterOperator, FilterValue, QueryParams, split_list};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryStringError {
    #[error("Invalid value '{value}' for '{key}': expected a non-negative integer")]
    InvalidNumber { key: String, value: String },

    #[error("Pagination mixes page[size]/page[number] with page[limit]/page[offset]")]
    ConflictingPagination,

    #[error("Pagination requires page[size] or page[limit]")]
    IncompletePagination,
}

#[derive(Debug, Default)]
struct PageParts {
    size: Option<u64>,
    number: Option<u64>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl PageParts {
    fn is_empty(&self) -> bool {
        self.size.is_none() && self.number.is_none() && self.limit.is_none() && self.offset.is_none()
    }

    fn into_request(self) -> Result<Option<PageRequest>, QueryStringError> {
        if self.is_empty() {
            return Ok(None);
        }
        let numbered = self.size.is_some() || self.number.is_some();
        let offset = self.limit.is_some() || self.offset.is_some();
        if numbered && offset {
            return Err(QueryStringError::ConflictingPagination);
        }
        if let Some(size) = self.size {
            return Ok(Some(PageRequest::numbered(size, self.number.unwrap_or(1))));
        }
        if let Some(limit) = self.limit {
            return Ok(Some(PageRequest::offset(limit, self.offset.unwrap_or(0))));
        }
        Err(QueryStringError::IncompletePagination)
    }
}

pub struct QueryStringParser;

impl QueryStringParser {
    /// Parse an application/x-www-form-urlencoded query string.
    ///
    /// Unknown parameters are ignored. A filter value of exactly `null`
    /// becomes a null filter value.
    pub fn parse(query: &str) -> Result<QueryParams, QueryStringError> {
        let mut params = QueryParams::default();
        let mut page = PageParts::default();

        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let (name, segments) = split_brackets(&key);
            match (name, segments.as_slice()) {
                ("include", []) => params.include.extend(split_list(&value)),
                ("sort", []) => params.sort.extend(split_list(&value)),
                ("group", []) => params.group.extend(split_list(&value)),
                ("fields", [resource]) => params
                    .fields
                    .entry((*resource).to_string())
                    .or_default()
                    .extend(split_list(&value)),
                ("filter", [column]) => params.filter.push_equality(*column, filter_value(&value)),
                ("filter", [operator, column]) => match FilterOperator::parse(operator) {
                    Some(operator) => {
                        params
                            .filter
                            .push_typed(operator, *column, filter_value(&value))
                    }
                    None => {
                        tracing::debug!(key = %key, "Ignoring filter with unknown operator");
                    }
                },
                ("page", [part]) => {
                    let number = parse_number(&key, &value)?;
                    match *part {
                        "size" => page.size = Some(number),
                        "number" => page.number = Some(number),
                        "limit" => page.limit = Some(number),
                        "offset" => page.offset = Some(number),
                        _ => tracing::debug!(key = %key, "Ignoring unknown page parameter"),
                    }
                }
                _ => tracing::debug!(key = %key, "Ignoring unrecognized query parameter"),
            }
        }

        params.page = page.into_request()?;
        Ok(params)
    }
}

/// Convenience wrapper around [`QueryStringParser::parse`].
pub fn parse_query_string(query: &str) -> Result<QueryParams, QueryStringError> {
    QueryStringParser::parse(query)
}

/// Split `filter[like][title]` into `("filter", ["like", "title"])`.
///
/// A key with unbalanced brackets is returned whole with no segments.
fn split_brackets(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    let name = &key[..open];
    let mut rest = &key[open..];
    let mut segments = Vec::new();

    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return (key, Vec::new());
        };
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }

    if !rest.is_empty() {
        return (key, Vec::new());
    }
    (name, segments)
}

fn filter_value(raw: &str) -> FilterValue {
    if raw == "null" {
        FilterValue::Null
    } else {
        FilterValue::single(raw)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, QueryStringError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryStringError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FilterClause;

    #[test]
    fn test_split_brackets() {
        assert_eq!(split_brackets("include"), ("include", vec![]));
        assert_eq!(split_brackets("fields[articles]"), ("fields", vec!["articles"]));
        assert_eq!(
            split_brackets("filter[like][author.name]"),
            ("filter", vec!["like", "author.name"])
        );
        assert_eq!(split_brackets("filter[oops"), ("filter[oops", vec![]));
        assert_eq!(split_brackets("filter[a]b"), ("filter[a]b", vec![]));
    }

    #[test]
    fn test_parse_full_query() {
        let params = parse_query_string(
            "include=author,comments&fields[articles]=title,body&fields[author]=name\
             &sort=-created_at,title&group=status&page[size]=10&page[number]=2",
        )
        .unwrap();

        assert_eq!(params.include, vec!["author", "comments"]);
        assert_eq!(params.fields["articles"], vec!["title", "body"]);
        assert_eq!(params.fields["author"], vec!["name"]);
        assert_eq!(params.sort, vec!["-created_at", "title"]);
        assert_eq!(params.group, vec!["status"]);
        assert_eq!(params.page, Some(PageRequest::numbered(10, 2)));
    }

    #[test]
    fn test_parse_filters() {
        let params = parse_query_string(
            "filter[title]=a%2Cb&filter[like][body]=rust&filter[not][status]=null&filter[gt][views]=10&filter[bad][x]=1",
        )
        .unwrap();

        let clauses = params.filter.clauses();
        assert_eq!(clauses.len(), 4);
        assert_eq!(params.filter.equality("title"), Some(&FilterValue::single("a,b")));
        assert_eq!(
            params.filter.typed(FilterOperator::Not, "status"),
            Some(&FilterValue::Null)
        );
        assert!(matches!(
            &clauses[3],
            FilterClause::Typed { operator: FilterOperator::Gt, .. }
        ));
    }

    #[test]
    fn test_parse_repeated_filter_key() {
        let params = parse_query_string("filter[title]=a&filter[title]=b&filter[title]=null").unwrap();
        assert_eq!(params.filter.clauses().len(), 1);
        assert_eq!(
            params.filter.equality("title"),
            Some(&FilterValue::many([Some("a"), Some("b"), None]))
        );
    }

    #[test]
    fn test_parse_huge_page_number() {
        let params = parse_query_string("page[size]=10&page[number]=18446744073709551615").unwrap();
        let page = params.page.unwrap();
        assert_eq!(page, PageRequest::numbered(10, u64::MAX));
        assert_eq!(page.limit_offset(), (10, i64::MAX as u64));
    }

    #[test]
    fn test_parse_offset_pagination() {
        let params = parse_query_string("?page[limit]=5&page[offset]=15").unwrap();
        assert_eq!(params.page, Some(PageRequest::offset(5, 15)));
    }

    #[test]
    fn test_pagination_errors() {
        assert_eq!(
            parse_query_string("page[size]=abc"),
            Err(QueryStringError::InvalidNumber {
                key: "page[size]".into(),
                value: "abc".into()
            })
        );
        assert_eq!(
            parse_query_string("page[size]=1&page[limit]=2"),
            Err(QueryStringError::ConflictingPagination)
        );
        assert_eq!(
            parse_query_string("page[number]=2"),
            Err(QueryStringError::IncompletePagination)
        );
    }

    #[test]
    fn test_unknown_parameters_ignored() {
        let params = parse_query_string("foo=bar&fields=title").unwrap();
        assert_eq!(params, QueryParams::default());
    }
}
