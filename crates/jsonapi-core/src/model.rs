//! Resource types and relation descriptors.
//!
//! These are the read-only model metadata the query compiler consumes. A
//! [`RelationDescriptor`] only stores what was declared explicitly; default
//! key and junction names are derived on demand by [`RelationDescriptor::join_keys`]
//! using the naming conventions of the two types involved.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::naming::{IdentityNaming, NamingConvention};

/// A named entity backed by a storage table.
#[derive(Debug, Clone)]
pub struct ResourceType {
    /// Resource type name used by clients (e.g., "articles")
    pub name: String,
    /// Storage table name
    pub table: String,
    /// Name of the identifier column
    pub id_attribute: String,
    /// External to internal attribute naming
    pub naming: Arc<dyn NamingConvention>,
    /// Relations declared on this type, by relation name
    pub relations: IndexMap<String, RelationDescriptor>,
}

impl ResourceType {
    /// Create a resource type with an `id` identifier and identity naming.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_attribute: "id".to_string(),
            naming: Arc::new(IdentityNaming),
            relations: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_id_attribute(mut self, id_attribute: impl Into<String>) -> Self {
        self.id_attribute = id_attribute.into();
        self
    }

    #[must_use]
    pub fn with_naming(mut self, naming: Arc<dyn NamingConvention>) -> Self {
        self.naming = naming;
        self
    }

    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>, relation: RelationDescriptor) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Get a declared relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// Map an external attribute name to its column name.
    pub fn format_column(&self, name: &str) -> String {
        self.naming.to_internal(name)
    }

    /// Singular form of the table name, the prefix of default foreign keys.
    pub fn singular_table(&self) -> String {
        self.naming.singularize(&self.table)
    }

    /// Default foreign key pointing at this type: `<singular table>_<id>`.
    pub fn default_foreign_key(&self) -> String {
        format!("{}_{}", self.singular_table(), self.id_attribute)
    }
}

/// The kind of a relation between two resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// To-one, foreign key on the parent
    BelongsTo,
    /// To-one, foreign key on the child
    HasOne,
    /// To-many, foreign key on the child
    HasMany,
    /// Many-to-many through a junction table
    BelongsToMany,
    /// Polymorphic to-one, discriminated on the child
    MorphOne,
    /// Polymorphic to-many, discriminated on the child
    MorphMany,
    /// Polymorphic inverse whose target depends on the row
    MorphTo,
}

impl RelationKind {
    /// Parse a relation kind from its configuration name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "belongs_to" | "belongsTo" => Some(Self::BelongsTo),
            "has_one" | "hasOne" => Some(Self::HasOne),
            "has_many" | "hasMany" => Some(Self::HasMany),
            "belongs_to_many" | "belongsToMany" => Some(Self::BelongsToMany),
            "morph_one" | "morphOne" => Some(Self::MorphOne),
            "morph_many" | "morphMany" => Some(Self::MorphMany),
            "morph_to" | "morphTo" => Some(Self::MorphTo),
            _ => None,
        }
    }

    /// True for relations that can yield more than one related row.
    pub fn is_many(self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany | Self::MorphMany)
    }

    /// True when the parent row holds the foreign key.
    pub fn is_belongs_to(self) -> bool {
        matches!(self, Self::BelongsTo)
    }

    pub fn is_polymorphic(self) -> bool {
        matches!(self, Self::MorphOne | Self::MorphMany | Self::MorphTo)
    }
}

/// Junction table settings for many-to-many relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Through {
    pub table: Option<String>,
    /// Junction column referencing the parent
    pub foreign_key: Option<String>,
    /// Junction column referencing the target
    pub other_key: Option<String>,
}

/// Discriminator settings for polymorphic relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Morph {
    /// Morph name, the prefix of the default discriminator columns
    pub name: String,
    pub id_column: Option<String>,
    pub type_column: Option<String>,
    /// Discriminator value identifying the parent type
    pub value: Option<String>,
}

/// Declared metadata of one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub kind: RelationKind,
    /// Target resource type name
    pub target: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub parent_key: Option<String>,
    #[serde(default)]
    pub target_key: Option<String>,
    #[serde(default)]
    pub through: Option<Through>,
    #[serde(default)]
    pub morph: Option<Morph>,
}

/// Fully resolved join keys for one relation hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKeys {
    /// `parent.foreign_key = child.target_key`
    BelongsTo {
        foreign_key: String,
        target_key: String,
    },
    /// `parent.parent_key = child.foreign_key`
    HasOneOrMany {
        parent_key: String,
        foreign_key: String,
    },
    /// `parent.parent_key = junction.foreign_key`, then
    /// `junction.other_key = child.target_key`
    Through {
        parent_key: String,
        junction: String,
        foreign_key: String,
        other_key: String,
        target_key: String,
    },
    /// `child.id_column = parent.parent_key AND child.type_column = value`
    Morph {
        parent_key: String,
        id_column: String,
        type_column: String,
        value: String,
    },
}

impl RelationDescriptor {
    fn new(kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            foreign_key: None,
            parent_key: None,
            target_key: None,
            through: None,
            morph: None,
        }
    }

    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, target)
    }

    pub fn has_one(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, target)
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, target)
    }

    pub fn belongs_to_many(target: impl Into<String>) -> Self {
        let mut relation = Self::new(RelationKind::BelongsToMany, target);
        relation.through = Some(Through::default());
        relation
    }

    pub fn morph_one(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(RelationKind::MorphOne, target).with_morph_name(name)
    }

    pub fn morph_many(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(RelationKind::MorphMany, target).with_morph_name(name)
    }

    /// A polymorphic inverse. The target is only known per row, so the
    /// `target` here is informational.
    pub fn morph_to(name: impl Into<String>) -> Self {
        Self::new(RelationKind::MorphTo, "").with_morph_name(name)
    }

    fn with_morph_name(mut self, name: impl Into<String>) -> Self {
        self.morph = Some(Morph {
            name: name.into(),
            id_column: None,
            type_column: None,
            value: None,
        });
        self
    }

    #[must_use]
    pub fn with_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_parent_key(mut self, key: impl Into<String>) -> Self {
        self.parent_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_target_key(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_through(mut self, through: Through) -> Self {
        self.through = Some(through);
        self
    }

    /// Set the discriminator value stored for the parent type.
    #[must_use]
    pub fn with_morph_value(mut self, value: impl Into<String>) -> Self {
        if let Some(morph) = self.morph.as_mut() {
            morph.value = Some(value.into());
        }
        self
    }

    /// Resolve the join keys between `parent` and `target`, filling in
    /// convention defaults for everything not declared.
    ///
    /// Returns `None` for `MorphTo`, whose target cannot be joined statically.
    pub fn join_keys(&self, parent: &ResourceType, target: &ResourceType) -> Option<JoinKeys> {
        let parent_key = || {
            self.parent_key
                .clone()
                .unwrap_or_else(|| parent.id_attribute.clone())
        };
        let target_key = || {
            self.target_key
                .clone()
                .unwrap_or_else(|| target.id_attribute.clone())
        };

        match self.kind {
            RelationKind::BelongsTo => Some(JoinKeys::BelongsTo {
                foreign_key: self
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| target.default_foreign_key()),
                target_key: target_key(),
            }),
            RelationKind::HasOne | RelationKind::HasMany => Some(JoinKeys::HasOneOrMany {
                parent_key: parent_key(),
                foreign_key: self
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| parent.default_foreign_key()),
            }),
            RelationKind::BelongsToMany => {
                let through = self.through.clone().unwrap_or_default();
                let junction = through.table.unwrap_or_else(|| {
                    let mut tables = [parent.table.as_str(), target.table.as_str()];
                    tables.sort_unstable();
                    tables.join("_")
                });
                Some(JoinKeys::Through {
                    parent_key: parent_key(),
                    junction,
                    foreign_key: through
                        .foreign_key
                        .or_else(|| self.foreign_key.clone())
                        .unwrap_or_else(|| parent.default_foreign_key()),
                    other_key: through
                        .other_key
                        .unwrap_or_else(|| target.default_foreign_key()),
                    target_key: target_key(),
                })
            }
            RelationKind::MorphOne | RelationKind::MorphMany => {
                let morph = self.morph.clone().unwrap_or_else(|| Morph {
                    name: parent.singular_table(),
                    id_column: None,
                    type_column: None,
                    value: None,
                });
                Some(JoinKeys::Morph {
                    parent_key: parent_key(),
                    id_column: morph
                        .id_column
                        .unwrap_or_else(|| format!("{}_id", morph.name)),
                    type_column: morph
                        .type_column
                        .unwrap_or_else(|| format!("{}_type", morph.name)),
                    value: morph.value.unwrap_or_else(|| parent.table.clone()),
                })
            }
            RelationKind::MorphTo => None,
        }
    }

    /// Column on the parent row that references the target, if the parent is
    /// the owning side.
    pub fn owning_foreign_key(&self, target: &ResourceType) -> Option<String> {
        match self.kind {
            RelationKind::BelongsTo => Some(
                self.foreign_key
                    .clone()
                    .unwrap_or_else(|| target.default_foreign_key()),
            ),
            RelationKind::MorphTo => self.morph.as_ref().map(|m| {
                m.id_column
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", m.name))
            }),
            _ => None,
        }
    }

    /// Column on the related row that references the parent, if the related
    /// row holds it directly.
    pub fn child_foreign_key(&self, parent: &ResourceType, target: &ResourceType) -> Option<String> {
        match self.join_keys(parent, target)? {
            JoinKeys::HasOneOrMany { foreign_key, .. } => Some(foreign_key),
            JoinKeys::Morph { id_column, .. } => Some(id_column),
            JoinKeys::BelongsTo { .. } | JoinKeys::Through { .. } => None,
        }
    }
}
