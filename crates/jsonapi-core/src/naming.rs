//! Naming conventions for mapping client-facing attribute names to storage
//! column names.
//!
//! A convention is a pure mapping capability attached to each resource type.
//! It also owns singular/plural inflection, which is needed to derive default
//! foreign key and junction table names.

use heck::{ToLowerCamelCase, ToSnakeCase};
use std::fmt;
use std::sync::Arc;

use crate::error::CoreError;

/// Maps attribute names between the external (client) and internal (storage)
/// representation of a resource type.
pub trait NamingConvention: Send + Sync + fmt::Debug {
    /// Map an external attribute name to its storage column name.
    fn to_internal(&self, name: &str) -> String;

    /// Map a storage column name back to its external attribute name.
    fn to_external(&self, name: &str) -> String;

    /// Singular form of a table name, used for default key derivation.
    fn singularize(&self, word: &str) -> String {
        singularize(word)
    }

    /// Plural form of a word.
    fn pluralize(&self, word: &str) -> String {
        pluralize(word)
    }
}

/// Leaves every name untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityNaming;

impl NamingConvention for IdentityNaming {
    fn to_internal(&self, name: &str) -> String {
        name.to_string()
    }

    fn to_external(&self, name: &str) -> String {
        name.to_string()
    }
}

/// `camelCase` attributes stored as `snake_case` columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnakeCaseNaming;

impl NamingConvention for SnakeCaseNaming {
    fn to_internal(&self, name: &str) -> String {
        if is_plain_identifier(name) {
            name.to_snake_case()
        } else {
            name.to_string()
        }
    }

    fn to_external(&self, name: &str) -> String {
        if is_plain_identifier(name) {
            name.to_lower_camel_case()
        } else {
            name.to_string()
        }
    }
}

/// Look up a built-in convention by its configuration name.
pub fn naming_by_name(name: &str) -> Result<Arc<dyn NamingConvention>, CoreError> {
    match name {
        "identity" | "none" => Ok(Arc::new(IdentityNaming)),
        "snake_case" | "snake" => Ok(Arc::new(SnakeCaseNaming)),
        other => Err(CoreError::UnknownNamingConvention(other.to_string())),
    }
}

/// Names made of anything other than ASCII alphanumerics and underscores are
/// not attribute names (`*`, expressions) and pass through unchanged.
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("goose", "geese"),
    ("mouse", "mice"),
    ("datum", "data"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
    ("analysis", "analyses"),
    ("crisis", "crises"),
];

/// Simple English pluralization.
pub fn pluralize(word: &str) -> String {
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
        return (*plural).to_string();
    }
    if word.is_empty() {
        return String::new();
    }

    if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh")
    {
        return format!("{word}es");
    }

    if let Some(stripped) = word.strip_suffix('y')
        && stripped.chars().last().is_some_and(|c| !"aeiou".contains(c))
    {
        return format!("{stripped}ies");
    }

    format!("{word}s")
}

/// Simple English singularization, the inverse of [`pluralize`] for the
/// regular cases.
pub fn singularize(word: &str) -> String {
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == word) {
        return (*singular).to_string();
    }

    if let Some(stripped) = word.strip_suffix("ies")
        && !stripped.is_empty()
    {
        return format!("{stripped}y");
    }

    for suffix in ["sses", "xes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }

    if let Some(stripped) = word.strip_suffix('s')
        && !stripped.is_empty()
        && !stripped.ends_with('s')
    {
        return stripped.to_string();
    }

    word.to_string()
}
