//! Sparse fieldset compilation for the base type.
//!
//! Fieldsets keyed by an included relation are handled by the include
//! builder; fieldsets keyed by the base type become a `SELECT DISTINCT`
//! projection.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

use jsonapi_core::RelationKind;

use crate::context::{AttributeTarget, CompilationContext};
use crate::error::QueryError;
use crate::jsonb;
use crate::sql_builder::{AggregateFunction, ColumnRef, Projection, QueryBuilder};

/// `count(col)`, `sum(col)`, `avg(col)`, `max(col)` or `min(col)`
static AGGREGATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(count|sum|avg|max|min)\(([^()]+)\)$").expect("Invalid aggregate regex")
});

/// True if the fieldset key addresses the base type.
pub fn is_base_key(ctx: &CompilationContext<'_>, key: &str) -> bool {
    key.is_empty() || key == ctx.base().name || key == ctx.alias()
}

/// True if any fieldset addresses the base type.
pub fn has_base_fields(ctx: &CompilationContext<'_>, fields: &IndexMap<String, Vec<String>>) -> bool {
    fields.keys().any(|key| is_base_key(ctx, key))
}

/// Compile fieldsets that are not consumed by includes.
pub fn compile_fields(
    ctx: &mut CompilationContext<'_>,
    qb: &mut QueryBuilder,
    fields: &IndexMap<String, Vec<String>>,
    include: &[String],
) -> Result<(), QueryError> {
    for (key, names) in fields {
        if is_base_key(ctx, key) {
            compile_base_fields(ctx, qb, names, include)?;
        } else if include.iter().any(|path| path == key) {
            continue;
        } else if qb.has_join(key) {
            for name in names {
                if let Some(column) = ctx.qualify_column(&format!("{key}.{name}"))? {
                    qb.select_column(column);
                }
            }
        } else {
            tracing::debug!(key = %key, "Ignoring fieldset for a relation that is neither included nor joined");
        }
    }
    Ok(())
}

fn compile_base_fields(
    ctx: &mut CompilationContext<'_>,
    qb: &mut QueryBuilder,
    names: &[String],
    include: &[String],
) -> Result<(), QueryError> {
    qb.distinct();

    for name in names {
        if let Some(caps) = AGGREGATE_REGEX.captures(name) {
            let Some(function) = AggregateFunction::parse(&caps[1]) else {
                continue;
            };
            if let Some(column) = ctx.qualify_column(caps[2].trim())? {
                if is_projectable(ctx, qb, &column)? {
                    qb.select(Projection::Aggregate {
                        function,
                        column,
                        alias: function.as_str().to_string(),
                    });
                }
            }
            continue;
        }

        match ctx.qualify(name)? {
            Some(AttributeTarget::Column(column)) => {
                if is_projectable(ctx, qb, &column)? {
                    qb.select_column(column);
                }
            }
            Some(AttributeTarget::Json(attribute)) => {
                if is_projectable(ctx, qb, &attribute.column)? {
                    jsonb::build_select(qb, &attribute);
                }
            }
            None => {}
        }
    }

    add_relation_keys(ctx, qb, include);
    Ok(())
}

/// A column is projectable if it belongs to the base alias or to a relation
/// already joined by a filter, sort or group dependency.
fn is_projectable(
    ctx: &CompilationContext<'_>,
    qb: &QueryBuilder,
    column: &ColumnRef,
) -> Result<bool, QueryError> {
    match column.table.as_deref() {
        Some(alias) if alias != ctx.alias() && !qb.has_join(alias) => ctx
            .reject::<()>(QueryError::unsupported_relation(
                ctx.base().name.clone(),
                alias,
                "fields may only reference relations that are filtered, sorted or grouped on",
            ))
            .map(|_| false),
        _ => Ok(true),
    }
}

/// Make sure included relations can still be matched to the projected rows:
/// the owning foreign key of a belongs-to relation, or the base id for
/// relations whose rows point back at the base.
fn add_relation_keys(ctx: &CompilationContext<'_>, qb: &mut QueryBuilder, include: &[String]) {
    let base = ctx.base();
    let alias = ctx.alias().to_string();

    for path in include {
        let first = path.split('.').next().unwrap_or(path);
        let Some(relation) = base.relation(first) else {
            continue;
        };

        let key = match relation.kind {
            RelationKind::BelongsTo | RelationKind::MorphTo => {
                let target = ctx.resource_type(&relation.target);
                match (relation.kind, target) {
                    (RelationKind::BelongsTo, Some(target)) => relation.owning_foreign_key(&target),
                    (RelationKind::MorphTo, _) => relation.morph.as_ref().map(|m| {
                        m.id_column
                            .clone()
                            .unwrap_or_else(|| format!("{}_id", m.name))
                    }),
                    _ => None,
                }
            }
            _ => Some(relation.parent_key.clone().unwrap_or_else(|| base.id_attribute.clone())),
        };

        if let Some(key) = key {
            let column = ColumnRef::new(alias.clone(), key);
            if !qb.selects_column(&column) {
                qb.select_column(column);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::blog_registry;
    use crate::dependencies::DependencyTree;
    use crate::joins::emit_joins;
    use jsonapi_core::TypeRegistry;

    fn compile(fields: IndexMap<String, Vec<String>>, include: &[&str]) -> String {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let mut ctx = CompilationContext::new(&registry, base, "articles", false);
        let mut qb = QueryBuilder::new("articles", "articles");
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        compile_fields(&mut ctx, &mut qb, &fields, &include).unwrap();
        qb.build().unwrap().sql
    }

    fn fieldset(key: &str, names: &[&str]) -> IndexMap<String, Vec<String>> {
        let mut fields = IndexMap::new();
        fields.insert(key.to_string(), names.iter().map(|s| s.to_string()).collect());
        fields
    }

    #[test]
    fn test_base_fields_distinct() {
        let sql = compile(fieldset("articles", &["title", "body"]), &[]);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"articles\".\"title\", \"articles\".\"body\" FROM \"articles\""
        );
    }

    #[test]
    fn test_aggregates() {
        let sql = compile(fieldset("", &["status", "count(id)", "max(views)"]), &[]);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"articles\".\"status\", count(\"articles\".\"id\") AS \"count\", max(\"articles\".\"views\") AS \"max\" FROM \"articles\""
        );
    }

    #[test]
    fn test_belongs_to_foreign_key_injected() {
        let sql = compile(fieldset("articles", &["title"]), &["author"]);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"articles\".\"title\", \"articles\".\"author_id\" FROM \"articles\""
        );

        let sql = compile(fieldset("articles", &["author_id", "title"]), &["author.country"]);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"articles\".\"author_id\", \"articles\".\"title\" FROM \"articles\""
        );
    }

    #[test]
    fn test_base_id_injected_for_child_relations() {
        let sql = compile(fieldset("articles", &["title"]), &["comments", "tags"]);
        assert_eq!(
            sql,
            "SELECT DISTINCT \"articles\".\"title\", \"articles\".\"id\" FROM \"articles\""
        );
    }

    #[test]
    fn test_json_field() {
        let sql = compile(fieldset("articles", &["meta:stats.views:numeric"]), &[]);
        assert_eq!(
            sql,
            "SELECT DISTINCT (\"articles\".\"meta\" #>> $1)::numeric AS \"views\" FROM \"articles\""
        );
    }

    #[test]
    fn test_included_fieldsets_skipped() {
        let sql = compile(fieldset("author", &["name"]), &["author"]);
        assert_eq!(sql, "SELECT * FROM \"articles\"");
    }

    #[test]
    fn test_unjoined_relation_fields_dropped() {
        let sql = compile(
            fieldset("", &["title", "count(author.id)", "author.firstName"]),
            &[],
        );
        assert_eq!(sql, "SELECT DISTINCT \"articles\".\"title\" FROM \"articles\"");
    }

    #[test]
    fn test_unjoined_relation_fields_strict() {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let mut ctx = CompilationContext::new(&registry, base, "articles", true);
        let mut qb = QueryBuilder::new("articles", "articles");
        let err = compile_fields(&mut ctx, &mut qb, &fieldset("", &["count(author.id)"]), &[]).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedRelation { ref relation, .. } if relation == "author"));
    }

    #[test]
    fn test_joined_relation_fields_projected() {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let mut ctx = CompilationContext::new(&registry, base, "articles", true);
        let mut qb = QueryBuilder::new("articles", "articles");
        let mut tree = DependencyTree::new();
        tree.insert_path(["author"]);
        emit_joins(&ctx, &mut qb, &tree).unwrap();

        let fields = fieldset("", &["author.firstName", "count(author.id)"]);
        compile_fields(&mut ctx, &mut qb, &fields, &[]).unwrap();
        assert_eq!(
            qb.build().unwrap().sql,
            "SELECT DISTINCT \"author\".\"first_name\", count(\"author\".\"id\") AS \"count\" \
             FROM \"articles\" \
             LEFT OUTER JOIN \"people\" AS \"author\" ON \"articles\".\"author_id\" = \"author\".\"id\""
        );
    }

    #[test]
    fn test_aggregate_regex() {
        assert!(AGGREGATE_REGEX.is_match("count(id)"));
        assert!(AGGREGATE_REGEX.is_match("avg(views)"));
        assert!(!AGGREGATE_REGEX.is_match("median(id)"));
        assert!(!AGGREGATE_REGEX.is_match("count(id); DROP"));
    }
}
