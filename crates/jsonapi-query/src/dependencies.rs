//! Relation dependencies of filter, group and sort keys.

use indexmap::IndexMap;

use crate::context::CompilationContext;
use crate::error::QueryError;
use crate::params::Filter;
use crate::resolver::AttributeKey;
use crate::sort::parse_sort_entry;

/// Tree of relation names that must be joined, in first-seen order.
///
/// Each relation appears once per parent regardless of how many keys
/// reference it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTree {
    children: IndexMap<String, DependencyTree>,
}

impl DependencyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a chain of relation names below the root.
    pub fn insert_path<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let mut node = self;
        for name in names {
            node = node.children.entry(name.to_string()).or_default();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DependencyTree> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &DependencyTree)> {
        self.children.iter()
    }

    /// Number of relations in the tree.
    pub fn len(&self) -> usize {
        self.children.values().map(|child| 1 + child.len()).sum()
    }
}

/// Collect the relations traversed by filter, group and sort keys.
///
/// Single-segment keys are base attributes and add nothing.
pub fn collect_dependencies(
    ctx: &CompilationContext<'_>,
    filter: &Filter,
    group: &[String],
    sort: &[String],
) -> Result<DependencyTree, QueryError> {
    let mut tree = DependencyTree::new();

    let keys = filter
        .keys()
        .into_iter()
        .chain(group.iter().map(String::as_str))
        .chain(sort.iter().map(|entry| parse_sort_entry(entry).0));

    for key in keys {
        let path = AttributeKey::parse(key).path;
        if !path.contains('.') {
            continue;
        }
        if let Some(resolved) = ctx.resolve_attribute(path)? {
            tree.insert_path(resolved.relation_names());
        }
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::blog_registry;
    use crate::params::{FilterOperator, FilterValue};
    use jsonapi_core::TypeRegistry;

    #[test]
    fn test_insert_path_deduplicates() {
        let mut tree = DependencyTree::new();
        tree.insert_path(["author", "country"]);
        tree.insert_path(["author"]);
        tree.insert_path(["comments"]);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.children().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["author", "comments"]);
        assert!(tree.get("author").unwrap().get("country").is_some());
    }

    #[test]
    fn test_collect_from_all_sources() {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let ctx = CompilationContext::new(&registry, base, "articles", false);

        let filter = Filter::new()
            .with_equality("title", FilterValue::single("x"))
            .with_typed(FilterOperator::Like, "author.name", FilterValue::single("a"));
        let group = vec!["comments.body".to_string()];
        let sort = vec!["-author.country.name".to_string(), "author.meta:a.b".to_string()];

        let tree = collect_dependencies(&ctx, &filter, &group, &sort).unwrap();
        assert_eq!(
            tree.children().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["author", "comments"]
        );
        assert!(tree.get("author").unwrap().get("country").is_some());
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_single_segment_keys_add_nothing() {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let ctx = CompilationContext::new(&registry, base, "articles", false);
        let filter = Filter::new().with_equality("author", FilterValue::single("1"));
        let tree = collect_dependencies(&ctx, &filter, &[], &["-title".to_string()]).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_unresolvable_keys() {
        let registry = blog_registry();
        let base = registry.resource_type("articles").unwrap();
        let filter = Filter::new().with_equality("editor.name", FilterValue::single("x"));

        let lenient = CompilationContext::new(&registry, base.clone(), "articles", false);
        assert!(collect_dependencies(&lenient, &filter, &[], &[]).unwrap().is_empty());

        let strict = CompilationContext::new(&registry, base, "articles", true);
        assert!(collect_dependencies(&strict, &filter, &[], &[]).is_err());
    }
}
