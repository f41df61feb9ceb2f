//! Per-request compilation state.

use std::sync::Arc;

use jsonapi_core::{ResourceType, TypeRegistry};

use crate::error::QueryError;
use crate::formatter::ColumnFormatter;
use crate::jsonb::JsonbAttribute;
use crate::resolver::{self, AttributeKey, ResolvedPath};
use crate::sql_builder::ColumnRef;

/// Where an attribute key points once resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeTarget {
    /// A plain column of the base table or of a joined relation
    Column(ColumnRef),
    /// A value inside a JSONB column
    Json(JsonbAttribute),
}

/// State shared by the compiler stages of one request.
///
/// Holds the base type and alias, the registry used to resolve relation
/// paths, the strictness setting and the column name cache. Nothing here
/// outlives the request.
pub struct CompilationContext<'a> {
    registry: &'a dyn TypeRegistry,
    base: Arc<ResourceType>,
    alias: String,
    strict: bool,
    formatter: ColumnFormatter,
}

impl<'a> CompilationContext<'a> {
    pub fn new(
        registry: &'a dyn TypeRegistry,
        base: Arc<ResourceType>,
        alias: impl Into<String>,
        strict: bool,
    ) -> Self {
        Self {
            registry,
            base,
            alias: alias.into(),
            strict,
            formatter: ColumnFormatter::new(),
        }
    }

    pub fn registry(&self) -> &'a dyn TypeRegistry {
        self.registry
    }

    pub fn base(&self) -> &Arc<ResourceType> {
        &self.base
    }

    /// Alias of the base table in the query.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn resource_type(&self, name: &str) -> Option<Arc<ResourceType>> {
        self.registry.resource_type(name)
    }

    pub fn format_column(&mut self, resource_type: &ResourceType, name: &str) -> String {
        self.formatter.format_one(resource_type, name)
    }

    pub fn format_columns<S: AsRef<str>>(&mut self, resource_type: &ResourceType, names: &[S]) -> Vec<String> {
        self.formatter.format(resource_type, names)
    }

    /// Fail in strict mode; otherwise log and drop.
    pub fn reject<T>(&self, error: QueryError) -> Result<Option<T>, QueryError> {
        if self.strict {
            Err(error)
        } else {
            tracing::debug!(error = %error, "Dropping unresolvable parameter");
            Ok(None)
        }
    }

    /// Resolve an attribute path from the base type.
    pub fn resolve_attribute(&self, path: &str) -> Result<Option<ResolvedPath>, QueryError> {
        match resolver::resolve_attribute_path(self.registry, &self.base, path) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(e) => self.reject(QueryError::invalid_path(path, e)),
        }
    }

    /// Resolve a path made only of relations from the base type.
    pub fn resolve_relations(&self, path: &str) -> Result<Option<ResolvedPath>, QueryError> {
        match resolver::resolve_relation_path(self.registry, &self.base, path) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(e) => self.reject(QueryError::invalid_path(path, e)),
        }
    }

    /// Resolve an attribute key to a qualified column or JSONB value.
    ///
    /// The column is qualified by the alias of the last relation traversed,
    /// or by the base alias, and formatted with the owning type's naming.
    pub fn qualify(&mut self, key: &str) -> Result<Option<AttributeTarget>, QueryError> {
        let parsed = AttributeKey::parse(key);
        let Some(resolved) = self.resolve_attribute(parsed.path)? else {
            return Ok(None);
        };

        if let Some(hop) = resolved.polymorphic_hop() {
            return self.reject(QueryError::unsupported_relation(
                hop.parent.name.clone(),
                hop.name.clone(),
                "polymorphic relations cannot be joined",
            ));
        }

        let Some(attribute) = resolved.attribute.as_deref() else {
            return self.reject(QueryError::NotAnAttribute(key.to_string()));
        };

        let (owner, alias) = resolved
            .last_hop()
            .and_then(|hop| hop.target.clone().map(|target| (target, hop.name.clone())))
            .unwrap_or_else(|| (Arc::clone(&self.base), self.alias.clone()));

        let column = ColumnRef::new(alias, self.format_column(&owner, attribute));

        Ok(Some(match parsed.json.filter(|json| !json.path.is_empty()) {
            Some(json) => AttributeTarget::Json(JsonbAttribute::new(column, json.path, json.data_type)),
            None => AttributeTarget::Column(column),
        }))
    }

    /// Like [`Self::qualify`], but only plain columns are accepted.
    pub fn qualify_column(&mut self, key: &str) -> Result<Option<ColumnRef>, QueryError> {
        match self.qualify(key)? {
            Some(AttributeTarget::Column(column)) => Ok(Some(column)),
            Some(AttributeTarget::Json(attribute)) => Ok(Some(attribute.column)),
            None => Ok(None),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::blog_registry;
    use super::*;
    use jsonapi_core::ModelRegistry;

    fn context(registry: &ModelRegistry, strict: bool) -> CompilationContext<'_> {
        let base = registry.resource_type("articles").unwrap();
        CompilationContext::new(registry, base, "articles", strict)
    }

    #[test]
    fn test_qualify_base_attribute() {
        let registry = blog_registry();
        let mut ctx = context(&registry, false);
        assert_eq!(
            ctx.qualify("title").unwrap(),
            Some(AttributeTarget::Column(ColumnRef::new("articles", "title")))
        );
    }

    #[test]
    fn test_qualify_relation_attribute_uses_target_naming() {
        let registry = blog_registry();
        let mut ctx = context(&registry, false);
        assert_eq!(
            ctx.qualify("author.firstName").unwrap(),
            Some(AttributeTarget::Column(ColumnRef::new("author", "first_name")))
        );
        assert_eq!(
            ctx.qualify_column("author.country.isoCode").unwrap(),
            Some(ColumnRef::new("country", "isoCode"))
        );
    }

    #[test]
    fn test_qualify_json_key() {
        let registry = blog_registry();
        let mut ctx = context(&registry, false);
        match ctx.qualify("author.meta:address.zip:numeric").unwrap() {
            Some(AttributeTarget::Json(attribute)) => {
                assert_eq!(attribute.column, ColumnRef::new("author", "meta"));
                assert_eq!(attribute.path, vec!["address", "zip"]);
            }
            other => panic!("unexpected target {other:?}"),
        }
        assert_eq!(
            ctx.qualify("meta:").unwrap(),
            Some(AttributeTarget::Column(ColumnRef::new("articles", "meta")))
        );
    }

    #[test]
    fn test_lenient_drops_invalid_paths() {
        let registry = blog_registry();
        let mut ctx = context(&registry, false);
        assert_eq!(ctx.qualify("editor.name").unwrap(), None);
        assert_eq!(ctx.qualify("author.country").unwrap(), None);
        assert_eq!(ctx.qualify("subject.title").unwrap(), None);
    }

    #[test]
    fn test_strict_rejects_invalid_paths() {
        let registry = blog_registry();
        let mut ctx = context(&registry, true);
        assert!(matches!(
            ctx.qualify("editor.name"),
            Err(QueryError::InvalidPath { .. })
        ));
        assert!(matches!(
            ctx.qualify("author.country"),
            Err(QueryError::NotAnAttribute(_))
        ));
        assert!(matches!(
            ctx.qualify("subject.title"),
            Err(QueryError::InvalidPath {
                source: crate::resolver::PathError::PolymorphicHop(_),
                ..
            })
        ));
        assert!(matches!(
            ctx.qualify("comments.commentable"),
            Err(QueryError::UnsupportedRelation { .. })
        ));
    }

    #[test]
    fn test_base_alias_override() {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let mut ctx = CompilationContext::new(&registry, base, "posts", false);
        assert_eq!(
            ctx.qualify_column("title").unwrap(),
            Some(ColumnRef::new("posts", "title"))
        );
    }
}
