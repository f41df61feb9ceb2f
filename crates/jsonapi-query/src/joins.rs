//! Join emission for a dependency tree.

use std::sync::Arc;

use jsonapi_core::{JoinKeys, RelationKind, ResourceType};
use jsonapi_storage::SqlValue;

use crate::context::CompilationContext;
use crate::dependencies::DependencyTree;
use crate::error::QueryError;
use crate::sql_builder::{ColumnRef, Join, QueryBuilder};

/// Emit LEFT OUTER JOINs for every relation in `tree`, depth first.
///
/// Each relation is joined under an alias equal to its name, so a relation
/// name reached through two different parents is only joined once.
/// `morph_to` relations are never joined.
pub fn emit_joins(
    ctx: &CompilationContext<'_>,
    qb: &mut QueryBuilder,
    tree: &DependencyTree,
) -> Result<(), QueryError> {
    let base = Arc::clone(ctx.base());
    emit_level(ctx, qb, &base, ctx.alias(), tree)
}

fn emit_level(
    ctx: &CompilationContext<'_>,
    qb: &mut QueryBuilder,
    parent: &ResourceType,
    parent_alias: &str,
    node: &DependencyTree,
) -> Result<(), QueryError> {
    for (name, child) in node.children() {
        let Some(relation) = parent.relation(name) else {
            ctx.reject::<()>(QueryError::unsupported_relation(
                parent.name.clone(),
                name.clone(),
                "relation is not declared",
            ))?;
            continue;
        };

        if relation.kind == RelationKind::MorphTo {
            if ctx.is_strict() {
                return Err(QueryError::unsupported_relation(
                    parent.name.clone(),
                    name.clone(),
                    "polymorphic relations cannot be joined",
                ));
            }
            tracing::warn!(relation = %name, parent = %parent.name, "Skipping join of polymorphic relation");
            continue;
        }

        let Some(target) = ctx.resource_type(&relation.target) else {
            ctx.reject::<()>(QueryError::unsupported_relation(
                parent.name.clone(),
                name.clone(),
                format!("target type '{}' is not registered", relation.target),
            ))?;
            continue;
        };

        let Some(keys) = relation.join_keys(parent, &target) else {
            continue;
        };

        for join in joins_for(parent_alias, name, &target.table, keys) {
            if qb.join(join) {
                tracing::debug!(relation = %name, parent = %parent_alias, "Joined relation");
            }
        }

        emit_level(ctx, qb, &target, name, child)?;
    }

    Ok(())
}

fn joins_for(parent_alias: &str, alias: &str, table: &str, keys: JoinKeys) -> Vec<Join> {
    match keys {
        JoinKeys::BelongsTo {
            foreign_key,
            target_key,
        } => vec![Join::left(table, alias).on(
            ColumnRef::new(parent_alias, foreign_key),
            ColumnRef::new(alias, target_key),
        )],

        JoinKeys::HasOneOrMany {
            parent_key,
            foreign_key,
        } => vec![Join::left(table, alias).on(
            ColumnRef::new(parent_alias, parent_key),
            ColumnRef::new(alias, foreign_key),
        )],

        JoinKeys::Through {
            parent_key,
            junction,
            foreign_key,
            other_key,
            target_key,
        } => vec![
            Join::left(junction.clone(), junction.clone()).on(
                ColumnRef::new(parent_alias, parent_key),
                ColumnRef::new(junction.clone(), foreign_key),
            ),
            Join::left(table, alias).on(
                ColumnRef::new(junction, other_key),
                ColumnRef::new(alias, target_key),
            ),
        ],

        JoinKeys::Morph {
            parent_key,
            id_column,
            type_column,
            value,
        } => vec![
            Join::left(table, alias)
                .on(
                    ColumnRef::new(alias, id_column),
                    ColumnRef::new(parent_alias, parent_key),
                )
                .on_value(ColumnRef::new(alias, type_column), SqlValue::Text(value)),
        ],
    }
}
