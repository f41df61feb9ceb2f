//! Resource type registry.
//!
//! The query compiler never probes live model instances. It asks a
//! [`TypeRegistry`] for the metadata of a type or of one of its relations.
//! [`ModelRegistry`] is the in-memory implementation, backed by DashMap so
//! that types can be registered while other threads compile queries.

use dashmap::DashMap;
use std::sync::Arc;

use crate::model::{RelationDescriptor, ResourceType};

/// Capability for resolving model metadata by name.
pub trait TypeRegistry: Send + Sync {
    /// Get a resource type by name.
    fn resource_type(&self, name: &str) -> Option<Arc<ResourceType>>;

    /// Get a relation declared on a resource type.
    fn relation(&self, resource_type: &str, relation: &str) -> Option<RelationDescriptor> {
        self.resource_type(resource_type)?
            .relation(relation)
            .cloned()
    }
}

/// In-memory registry of resource types.
///
/// Thread-safe with lock-free reads using DashMap.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    /// Types indexed by resource type name
    by_name: DashMap<String, Arc<ResourceType>>,
    /// Resource type names indexed by table name
    by_table: DashMap<String, String>,
}

impl ModelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_table: DashMap::new(),
        }
    }

    /// Register a resource type, replacing any previous type with the same name.
    pub fn register(&self, resource_type: ResourceType) {
        let resource_type = Arc::new(resource_type);
        tracing::debug!(
            resource_type = %resource_type.name,
            table = %resource_type.table,
            relations = resource_type.relations.len(),
            "Registered resource type"
        );
        self.by_table
            .insert(resource_type.table.clone(), resource_type.name.clone());
        self.by_name
            .insert(resource_type.name.clone(), resource_type);
    }

    /// Remove a resource type by name.
    ///
    /// Returns true if the type was found and removed.
    pub fn remove(&self, name: &str) -> bool {
        if let Some((_, resource_type)) = self.by_name.remove(name) {
            self.by_table.remove(&resource_type.table);
            true
        } else {
            false
        }
    }

    /// Get a resource type by its storage table name.
    pub fn get_by_table(&self, table: &str) -> Option<Arc<ResourceType>> {
        let name = self.by_table.get(table)?.value().clone();
        self.resource_type(&name)
    }

    /// Names of all registered types.
    pub fn names(&self) -> Vec<String> {
        self.by_name.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Get the total number of registered types.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl TypeRegistry for ModelRegistry {
    fn resource_type(&self, name: &str) -> Option<Arc<ResourceType>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_registry() -> ModelRegistry {
        let registry = ModelRegistry::new();
        registry.register(
            ResourceType::new("articles", "articles")
                .with_relation("author", RelationDescriptor::belongs_to("people")),
        );
        registry.register(ResourceType::new("people", "people"));
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = create_test_registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.resource_type("articles").is_some());
        assert!(registry.resource_type("comments").is_none());
    }

    #[test]
    fn test_relation_lookup() {
        let registry = create_test_registry();
        let relation = registry.relation("articles", "author").unwrap();
        assert_eq!(relation.target, "people");
        assert!(registry.relation("articles", "editor").is_none());
        assert!(registry.relation("comments", "author").is_none());
    }

    #[test]
    fn test_get_by_table() {
        let registry = create_test_registry();
        let people = registry.get_by_table("people").unwrap();
        assert_eq!(people.name, "people");
    }

    #[test]
    fn test_remove() {
        let registry = create_test_registry();
        assert!(registry.remove("people"));
        assert!(!registry.remove("people"));
        assert!(registry.get_by_table("people").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_replace_existing() {
        let registry = create_test_registry();
        registry.register(ResourceType::new("people", "people").with_id_attribute("uuid"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resource_type("people").unwrap().id_attribute, "uuid");
    }
}
