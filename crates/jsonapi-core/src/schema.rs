//! Declarative model schema loaded from TOML.
//!
//! # Example
//!
//! ```toml
//! [[types]]
//! name = "articles"
//! naming = "snake_case"
//!
//! [types.relations.author]
//! kind = "belongs_to"
//! target = "people"
//! foreign_key = "author_id"
//!
//! [[types]]
//! name = "people"
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::model::{RelationDescriptor, RelationKind, ResourceType};
use crate::naming::naming_by_name;
use crate::registry::ModelRegistry;

/// A set of resource type declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSchema {
    #[serde(default)]
    pub types: Vec<ResourceSchema>,
}

/// Declaration of one resource type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub name: String,
    /// Defaults to the type name
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_id")]
    pub id: String,
    /// One of `identity`, `snake_case`
    #[serde(default = "default_naming")]
    pub naming: String,
    #[serde(default)]
    pub relations: IndexMap<String, RelationDescriptor>,
}

fn default_id() -> String {
    "id".to_string()
}

fn default_naming() -> String {
    "identity".to_string()
}

impl ModelSchema {
    /// Parse a schema from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a schema file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check that every relation points at a declared type and that
    /// polymorphic relations carry a morph name.
    pub fn validate(&self) -> Result<()> {
        for resource in &self.types {
            for (name, relation) in &resource.relations {
                if relation.kind != RelationKind::MorphTo
                    && !self.types.iter().any(|t| t.name == relation.target)
                {
                    return Err(CoreError::invalid_schema(format!(
                        "relation {}.{} targets unknown type '{}'",
                        resource.name, name, relation.target
                    )));
                }
                if relation.kind.is_polymorphic() && relation.morph.is_none() {
                    return Err(CoreError::invalid_schema(format!(
                        "polymorphic relation {}.{} requires a morph name",
                        resource.name, name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate the schema and register every type.
    pub fn register_into(&self, registry: &ModelRegistry) -> Result<()> {
        self.validate()?;
        for resource in &self.types {
            registry.register(resource.to_resource_type()?);
        }
        Ok(())
    }

    /// Build a fresh registry from this schema.
    pub fn into_registry(self) -> Result<ModelRegistry> {
        let registry = ModelRegistry::new();
        self.register_into(&registry)?;
        Ok(registry)
    }
}

impl ResourceSchema {
    fn to_resource_type(&self) -> Result<ResourceType> {
        let table = self.table.clone().unwrap_or_else(|| self.name.clone());
        let mut resource_type = ResourceType::new(&self.name, table)
            .with_id_attribute(&self.id)
            .with_naming(naming_by_name(&self.naming)?);
        for (name, relation) in &self.relations {
            resource_type = resource_type.with_relation(name, relation.clone());
        }
        Ok(resource_type)
    }
}
