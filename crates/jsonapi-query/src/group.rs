//! GROUP BY compilation.

use crate::context::{AttributeTarget, CompilationContext};
use crate::error::QueryError;
use crate::sql_builder::{GroupTerm, QueryBuilder};

pub fn compile_group(
    ctx: &mut CompilationContext<'_>,
    qb: &mut QueryBuilder,
    group: &[String],
) -> Result<(), QueryError> {
    for key in group {
        match ctx.qualify(key)? {
            Some(AttributeTarget::Column(column)) => qb.group_by(GroupTerm::Column(column)),
            Some(AttributeTarget::Json(attribute)) => {
                qb.group_by(GroupTerm::Expression(attribute.expression()));
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::blog_registry;
    use jsonapi_core::TypeRegistry;

    #[test]
    fn test_compile_group() {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let mut ctx = CompilationContext::new(&registry, base, "articles", false);
        let mut qb = QueryBuilder::new("articles", "articles");

        compile_group(
            &mut ctx,
            &mut qb,
            &["status".to_string(), "author.firstName".to_string()],
        )
        .unwrap();

        assert!(qb.build().unwrap().sql.ends_with(
            "GROUP BY \"articles\".\"status\", \"author\".\"first_name\""
        ));
    }
}
