//! # jsonapi-core
//!
//! Model metadata consumed by the jsonapi-params query compiler: resource
//! types, relation descriptors, naming conventions and the registry
//! capability used to look them up.

pub mod error;
pub mod model;
pub mod naming;
pub mod registry;
pub mod schema;

pub use error::{CoreError, Result};
pub use model::{JoinKeys, Morph, RelationDescriptor, RelationKind, ResourceType, Through};
pub use naming::{IdentityNaming, NamingConvention, SnakeCaseNaming, naming_by_name};
pub use registry::{ModelRegistry, TypeRegistry};
pub use schema::{ModelSchema, ResourceSchema};
