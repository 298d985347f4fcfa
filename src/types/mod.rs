//! Value types: the basic type registry, type definitions and resolved types.

pub mod registry;
pub mod sql;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::binding::Datatype;

pub use registry::TypeRegistry;
pub use sql::SqlType;

/// Heuristic type lookup failure; never escapes the type resolvers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown type: {name}")]
    Unknown { name: String },

    #[error("invalid parameter {parameter}={value} for type {name}")]
    InvalidParameter {
        name: String,
        parameter: String,
        value: String,
    },

    #[error("type definition {name} refers back to itself")]
    Circular { name: String },
}

/// Broad kind of a resolved type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum TypeCategory {
    Basic,
    Entity { entity_name: String },
    Collection { role: String },
    Component { class: Option<String> },
}

/// A concrete value type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedType {
    pub name: String,
    #[serde(flatten)]
    pub category: TypeCategory,
    /// Relational type of the single column this type maps to, if any
    pub sql_type: Option<SqlType>,
    /// Name of the in-memory value type
    pub value_type: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, String>,
}

impl ResolvedType {
    pub fn datatype(&self) -> Option<Datatype> {
        self.sql_type.map(|sql_type| Datatype {
            type_code: sql_type.code(),
            type_name: self.name.clone(),
            value_type: self.value_type.clone(),
        })
    }

    pub fn is_basic(&self) -> bool {
        matches!(self.category, TypeCategory::Basic)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// A type registered in the basic type registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicType {
    pub name: String,
    /// Every name this type is found under, `name` included
    pub keys: Vec<String>,
    pub sql_type: SqlType,
    pub value_type: String,
}

impl BasicType {
    pub fn new(name: &str, sql_type: SqlType, value_type: &str, aliases: &[&str]) -> Self {
        let mut keys = vec![name.to_string()];
        keys.extend(aliases.iter().map(|alias| alias.to_string()));
        Self {
            name: name.to_string(),
            keys,
            sql_type,
            value_type: value_type.to_string(),
        }
    }

    pub fn to_resolved(&self, parameters: &IndexMap<String, String>) -> ResolvedType {
        ResolvedType {
            name: self.name.clone(),
            category: TypeCategory::Basic,
            sql_type: Some(self.sql_type),
            value_type: self.value_type.clone(),
            parameters: parameters.clone(),
        }
    }
}

/// Named specialization of another type with default parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDefinition {
    pub name: String,
    pub implementation: String,
    pub registration_keys: Vec<String>,
    pub parameters: IndexMap<String, String>,
}

impl From<&crate::source::TypeDefinitionSource> for TypeDefinition {
    fn from(source: &crate::source::TypeDefinitionSource) -> Self {
        Self {
            name: source.name.clone(),
            implementation: source.implementation.clone(),
            registration_keys: source.registration_keys.clone(),
            parameters: source.parameters.clone(),
        }
    }
}
