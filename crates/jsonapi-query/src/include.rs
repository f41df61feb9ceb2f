//! Include compilation into eager-load requests.

use indexmap::IndexMap;

use jsonapi_storage::EagerLoad;

use crate::context::CompilationContext;
use crate::error::QueryError;
use crate::sql_builder::QueryBuilder;

/// Add one eager load per include path.
///
/// When a fieldset is keyed by the include path, the related rows are
/// restricted to those columns plus the target id and, for relations whose
/// rows point back at the parent, the foreign key.
pub fn compile_includes(
    ctx: &mut CompilationContext<'_>,
    qb: &mut QueryBuilder,
    include: &[String],
    fields: &IndexMap<String, Vec<String>>,
) -> Result<(), QueryError> {
    for path in include {
        let Some(resolved) = ctx.resolve_relations(path)? else {
            continue;
        };
        let Some(hop) = resolved.last_hop() else {
            continue;
        };

        let load = match (fields.get(path), hop.target.as_ref()) {
            (Some(names), Some(target)) => {
                let mut columns = ctx.format_columns(target, names);
                if !columns.contains(&target.id_attribute) {
                    columns.insert(0, target.id_attribute.clone());
                }
                if let Some(foreign_key) = hop.relation.child_foreign_key(&hop.parent, target) {
                    if !columns.contains(&foreign_key) {
                        columns.push(foreign_key);
                    }
                }
                EagerLoad::with_columns(path.clone(), columns)
            }
            (Some(_), None) => {
                tracing::debug!(include = %path, "Loading polymorphic relation without a fieldset");
                EagerLoad::relation(path.clone())
            }
            (None, _) => EagerLoad::relation(path.clone()),
        };

        qb.with_related(load);
    }
    Ok(())
}
