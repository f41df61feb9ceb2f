//! Relation path resolution.
//!
//! A dotted path such as `author.country.name` is walked from the base type
//! through the registry, one relation per segment. The last segment of an
//! attribute path may be an attribute; every segment of a relation path must
//! be a relation.
//!
//! Attribute keys may also address a JSONB sub-attribute with
//! `column:json.path[:type]`, e.g. `author.meta:address.zip:numeric`.

use std::sync::Arc;
use thiserror::Error;

use jsonapi_core::{RelationDescriptor, RelationKind, ResourceType, TypeRegistry};

/// Why a path could not be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty path segment")]
    EmptySegment,

    #[error("Unknown relation '{segment}' on '{resource_type}'")]
    UnknownRelation {
        resource_type: String,
        segment: String,
    },

    #[error("Relation '{relation}' targets unregistered type '{target}'")]
    UnregisteredTarget { relation: String, target: String },

    #[error("Polymorphic relation '{0}' has no single target type")]
    PolymorphicHop(String),
}

/// One relation traversed by a path.
#[derive(Debug, Clone)]
pub struct RelationHop {
    /// Relation name, also the alias of its join
    pub name: String,
    pub relation: RelationDescriptor,
    pub parent: Arc<ResourceType>,
    /// None for polymorphic `morph_to` relations
    pub target: Option<Arc<ResourceType>>,
}

/// A resolved dotted path.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub hops: Vec<RelationHop>,
    pub attribute: Option<String>,
}

impl ResolvedPath {
    /// Relation names in traversal order.
    pub fn relation_names(&self) -> Vec<&str> {
        self.hops.iter().map(|hop| hop.name.as_str()).collect()
    }

    /// Last relation traversed, if any.
    pub fn last_hop(&self) -> Option<&RelationHop> {
        self.hops.last()
    }

    /// True if every hop can be joined.
    pub fn is_joinable(&self) -> bool {
        self.hops.iter().all(|hop| hop.target.is_some())
    }

    /// First hop that cannot be joined.
    pub fn polymorphic_hop(&self) -> Option<&RelationHop> {
        self.hops.iter().find(|hop| hop.target.is_none())
    }
}

/// An attribute key split into its relational path and optional JSONB part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeKey<'a> {
    /// Dotted path, e.g. `author.meta`
    pub path: &'a str,
    /// JSONB path and cast, if the key has a `:` part
    pub json: Option<JsonAccess<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonAccess<'a> {
    /// Dotted path inside the JSONB document
    pub path: &'a str,
    pub data_type: Option<&'a str>,
}

impl<'a> AttributeKey<'a> {
    /// Split `column:json.path[:type]`.
    pub fn parse(key: &'a str) -> Self {
        let mut parts = key.splitn(3, ':');
        let path = parts.next().unwrap_or_default();
        let json = parts.next().map(|json_path| JsonAccess {
            path: json_path,
            data_type: parts.next().filter(|t| !t.is_empty()),
        });
        Self { path, json }
    }
}

/// Resolve an attribute path from `base`.
///
/// A single segment is an attribute of the base type and is not looked up.
/// Otherwise segments are followed as relations; a final segment that is not
/// a relation becomes the attribute.
pub fn resolve_attribute_path(
    registry: &dyn TypeRegistry,
    base: &Arc<ResourceType>,
    path: &str,
) -> Result<ResolvedPath, PathError> {
    let segments = split_segments(path)?;
    if let [attribute] = segments.as_slice() {
        return Ok(ResolvedPath {
            hops: Vec::new(),
            attribute: Some((*attribute).to_string()),
        });
    }
    walk(registry, base, &segments, true)
}

/// Resolve a path in which every segment is a relation.
pub fn resolve_relation_path(
    registry: &dyn TypeRegistry,
    base: &Arc<ResourceType>,
    path: &str,
) -> Result<ResolvedPath, PathError> {
    let segments = split_segments(path)?;
    walk(registry, base, &segments, false)
}

fn split_segments(path: &str) -> Result<Vec<&str>, PathError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PathError::EmptySegment);
    }
    Ok(segments)
}

fn walk(
    registry: &dyn TypeRegistry,
    base: &Arc<ResourceType>,
    segments: &[&str],
    allow_attribute: bool,
) -> Result<ResolvedPath, PathError> {
    let mut hops: Vec<RelationHop> = Vec::with_capacity(segments.len());
    let mut current = Arc::clone(base);

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();

        let Some(relation) = current.relation(segment).cloned() else {
            if last && allow_attribute {
                return Ok(ResolvedPath {
                    hops,
                    attribute: Some((*segment).to_string()),
                });
            }
            return Err(PathError::UnknownRelation {
                resource_type: current.name.clone(),
                segment: (*segment).to_string(),
            });
        };

        if relation.kind == RelationKind::MorphTo {
            if !last {
                return Err(PathError::PolymorphicHop((*segment).to_string()));
            }
            hops.push(RelationHop {
                name: (*segment).to_string(),
                relation,
                parent: current,
                target: None,
            });
            break;
        }

        let target = registry.resource_type(&relation.target).ok_or_else(|| {
            PathError::UnregisteredTarget {
                relation: (*segment).to_string(),
                target: relation.target.clone(),
            }
        })?;

        hops.push(RelationHop {
            name: (*segment).to_string(),
            relation,
            parent: Arc::clone(&current),
            target: Some(Arc::clone(&target)),
        });
        current = target;
    }

    Ok(ResolvedPath {
        hops,
        attribute: None,
    })
}
