use indexmap::IndexMap;
use serde::Serialize;

use crate::types::ResolvedType;

/// Type information of an attribute or value
///
/// The resolved type is set at most once; afterwards it is authoritative.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeDescriptor {
    pub explicit_type_name: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub type_parameters: IndexMap<String, String>,
    pub value_type_name: Option<String>,
    resolved: Option<ResolvedType>,
}

impl TypeDescriptor {
    pub fn new(
        explicit_type_name: Option<String>,
        type_parameters: IndexMap<String, String>,
        value_type_name: Option<String>,
    ) -> Self {
        Self {
            explicit_type_name,
            type_parameters,
            value_type_name,
            resolved: None,
        }
    }

    pub fn explicit(type_name: &str) -> Self {
        Self::new(Some(type_name.to_string()), IndexMap::new(), None)
    }

    pub fn resolved(&self) -> Option<&ResolvedType> {
        self.resolved.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Set the resolved type and fill an empty value-type slot.
    ///
    /// Returns false, changing nothing, when a type is already resolved.
    pub(crate) fn resolve(&mut self, resolved: ResolvedType) -> bool {
        if self.resolved.is_some() {
            return false;
        }
        if self.value_type_name.is_none() {
            self.value_type_name = Some(resolved.value_type.clone());
        }
        self.resolved = Some(resolved);
        true
    }
}
