//! Sort compilation.

use crate::context::{AttributeTarget, CompilationContext};
use crate::error::QueryError;
use crate::jsonb;
use crate::sql_builder::{QueryBuilder, SortOrder};

/// Split a sort entry into its key and direction.
///
/// A leading `-` or `_` means descending.
pub fn parse_sort_entry(entry: &str) -> (&str, SortOrder) {
    match entry.strip_prefix('-').or_else(|| entry.strip_prefix('_')) {
        Some(key) => (key, SortOrder::Desc),
        None => (entry, SortOrder::Asc),
    }
}

/// Add one ORDER BY term per sort entry, in order.
pub fn compile_sort(
    ctx: &mut CompilationContext<'_>,
    qb: &mut QueryBuilder,
    sort: &[String],
) -> Result<(), QueryError> {
    for entry in sort {
        let (key, order) = parse_sort_entry(entry);
        match ctx.qualify(key)? {
            Some(AttributeTarget::Column(column)) => qb.order_by(column, order),
            Some(AttributeTarget::Json(attribute)) => {
                let direction = match order {
                    SortOrder::Asc => "asc",
                    SortOrder::Desc => "desc",
                };
                jsonb::build_sort(qb, direction, &attribute);
            }
            None => {}
        }
    }
    Ok(())
}
