//! Filter compilation.
//!
//! Clauses are compiled in request order and ANDed together.
//!
//! | Clause                 | Predicate                                         |
//! |------------------------|---------------------------------------------------|
//! | `filter[k]=a,b`        | `k IN (a, b)`, OR `k IS NULL` when null is given  |
//! | `filter[like][k]=a,b`  | `LOWER(k::text) LIKE LOWER('%a%') OR ...`         |
//! | `filter[not][k]=a,b`   | `k NOT IN (a, b)`, `k IS NOT NULL` for null       |
//! | `filter[lt][k]=a`      | `k < a` (also `lte`, `gt`, `gte`)                 |
//!
//! A key present both as an equality and under `like` is compiled once, as
//! part of the `like` group.

use jsonapi_storage::SqlValue;

use crate::context::{AttributeTarget, CompilationContext};
use crate::error::QueryError;
use crate::jsonb::{self, JsonbFilter};
use crate::params::{Filter, FilterClause, FilterOperator, FilterValue};
use crate::sql_builder::{ColumnRef, Condition, Operator, QueryBuilder};

pub fn compile_filters(
    ctx: &mut CompilationContext<'_>,
    qb: &mut QueryBuilder,
    filter: &Filter,
) -> Result<(), QueryError> {
    for clause in filter.clauses() {
        match clause {
            FilterClause::Equality { key, value } => {
                if filter.typed(FilterOperator::Like, key).is_some() {
                    continue;
                }
                match ctx.qualify(key)? {
                    Some(AttributeTarget::Column(column)) => {
                        qb.where_condition(equality_condition(column, value.values()));
                    }
                    Some(AttributeTarget::Json(attribute)) => {
                        jsonb::build_filter_with_type(qb, JsonbFilter::Equal, value.values(), &attribute, None);
                    }
                    None => {}
                }
            }
            FilterClause::Typed { operator, entries } => {
                for (key, value) in entries {
                    let Some(target) = ctx.qualify(key)? else {
                        continue;
                    };
                    let extra = match operator {
                        FilterOperator::Like => filter.equality(key),
                        _ => None,
                    };
                    compile_typed(qb, *operator, target, value, extra);
                }
            }
        }
    }
    Ok(())
}

fn compile_typed(
    qb: &mut QueryBuilder,
    operator: FilterOperator,
    target: AttributeTarget,
    value: &FilterValue,
    extra_equality: Option<&FilterValue>,
) {
    let column = match target {
        AttributeTarget::Column(column) => column,
        AttributeTarget::Json(attribute) => {
            let values = match operator {
                FilterOperator::Like | FilterOperator::Not => value.values(),
                _ => vec![value.scalar().map(str::to_string)],
            };
            jsonb::build_filter_with_type(
                qb,
                JsonbFilter::from(operator),
                values,
                &attribute,
                extra_equality.map(FilterValue::values),
            );
            return;
        }
    };

    match operator {
        FilterOperator::Like => {
            let mut group: Vec<Condition> = value
                .values()
                .into_iter()
                .flatten()
                .map(|v| Condition::Like {
                    column: column.clone(),
                    pattern: format!("%{v}%"),
                })
                .collect();
            if let Some(extra) = extra_equality {
                group.push(equality_condition(column, extra.values()));
            }
            if !group.is_empty() {
                qb.where_condition(Condition::or(group));
            }
        }

        FilterOperator::Not => {
            let (values, has_null) = split_nulls(value.values());
            if has_null {
                qb.where_condition(Condition::IsNotNull(column.clone()));
            }
            if !values.is_empty() {
                qb.where_condition(Condition::NotIn { column, values });
            }
        }

        FilterOperator::Lt | FilterOperator::Lte | FilterOperator::Gt | FilterOperator::Gte => {
            let Some(scalar) = value.scalar() else {
                tracing::debug!(column = %column, operator = %operator, "Skipping comparison with null");
                return;
            };
            let op = match operator {
                FilterOperator::Lt => Operator::Lt,
                FilterOperator::Lte => Operator::Le,
                FilterOperator::Gt => Operator::Gt,
                _ => Operator::Ge,
            };
            qb.where_condition(Condition::Compare {
                column,
                op,
                value: SqlValue::Text(scalar.to_string()),
            });
        }
    }
}

fn split_nulls(values: Vec<Option<String>>) -> (Vec<SqlValue>, bool) {
    let mut has_null = false;
    let values = values
        .into_iter()
        .filter_map(|v| {
            if v.is_none() {
                has_null = true;
            }
            v.map(SqlValue::Text)
        })
        .collect();
    (values, has_null)
}

/// `IN` over the non-null values, ORed with `IS NULL` if a null is present.
fn equality_condition(column: ColumnRef, values: Vec<Option<String>>) -> Condition {
    let (values, has_null) = split_nulls(values);
    match (has_null, values.is_empty()) {
        (true, true) => Condition::IsNull(column),
        (true, false) => Condition::or(vec![
            Condition::IsNull(column.clone()),
            Condition::In { column, values },
        ]),
        (false, _) => Condition::In { column, values },
    }
}
