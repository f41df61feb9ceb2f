//! Column name formatting with a per-compilation cache.

use std::collections::HashMap;

use jsonapi_core::ResourceType;

/// Maps external attribute names to column names through each type's naming
/// convention, remembering results for the lifetime of one compilation.
#[derive(Debug, Default)]
pub struct ColumnFormatter {
    cache: HashMap<(String, String), String>,
}

impl ColumnFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_one(&mut self, resource_type: &ResourceType, name: &str) -> String {
        self.cache
            .entry((resource_type.name.clone(), name.to_string()))
            .or_insert_with(|| resource_type.format_column(name))
            .clone()
    }

    /// Format names in order.
    pub fn format<S: AsRef<str>>(&mut self, resource_type: &ResourceType, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(|name| self.format_one(resource_type, name.as_ref()))
            .collect()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
