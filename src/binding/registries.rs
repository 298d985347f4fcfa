//! Global definitions collected alongside entity bindings.

use indexmap::IndexMap;
use serde::Serialize;

use crate::source::{
    FetchProfileSource, FilterDefinitionSource, GeneratorDefinitionSource, NamedNativeQuerySource,
    NamedQuerySource, ResultSetMappingSource,
};
use crate::types::{ResolvedType, TypeDefinition};

#[derive(Debug, Clone, Serialize)]
pub struct FilterParameter {
    pub type_name: String,
    pub resolved: Option<ResolvedType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterDefinition {
    pub name: String,
    pub condition: Option<String>,
    pub parameters: IndexMap<String, FilterParameter>,
}

impl From<&FilterDefinitionSource> for FilterDefinition {
    fn from(source: &FilterDefinitionSource) -> Self {
        Self {
            name: source.name.clone(),
            condition: source.condition.clone(),
            parameters: source
                .parameters
                .iter()
                .map(|(name, type_name)| {
                    (
                        name.clone(),
                        FilterParameter {
                            type_name: type_name.clone(),
                            resolved: None,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Named definitions, each keyed by name in registration order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registries {
    pub type_definitions: IndexMap<String, TypeDefinition>,
    pub filter_definitions: IndexMap<String, FilterDefinition>,
    pub identifier_generators: IndexMap<String, GeneratorDefinitionSource>,
    pub named_queries: IndexMap<String, NamedQuerySource>,
    pub named_native_queries: IndexMap<String, NamedNativeQuerySource>,
    pub result_set_mappings: IndexMap<String, ResultSetMappingSource>,
    pub fetch_profiles: IndexMap<String, FetchProfileSource>,
}

/// Insert `value` under `name`, warning when an earlier definition is replaced
pub(crate) fn replace_with_warning<T>(
    map: &mut IndexMap<String, T>,
    what: &str,
    name: &str,
    value: T,
) {
    if map.insert(name.to_string(), value).is_some() {
        tracing::warn!("Duplicate {} '{}' replaces the earlier definition", what, name);
    }
}
