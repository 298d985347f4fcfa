//! Entity bindings and per-hierarchy details.

use indexmap::IndexMap;
use serde::Serialize;

use super::type_descriptor::TypeDescriptor;
use super::{AttributeId, EntityId, TableId, ValueId};
use crate::id::IdentifierGeneratorBinding;
use crate::source::{AccessType, GeneratorSource, InheritanceStrategy, Origin};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caching {
    pub access: AccessType,
    pub region: String,
    pub include_lazy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityIdentifier {
    pub attribute: AttributeId,
    /// Generator as declared, turned into a generator by the last pass
    pub generator_source: Option<GeneratorSource>,
    pub unsaved_value: Option<String>,
    pub generator: Option<IdentifierGeneratorBinding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityDiscriminator {
    pub type_descriptor: TypeDescriptor,
    pub value: ValueId,
    pub forced: bool,
    pub inserted: bool,
}

/// Settings owned by the root of an inheritance hierarchy
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyDetails {
    pub strategy: InheritanceStrategy,
    pub identifier: Option<EntityIdentifier>,
    pub discriminator: Option<EntityDiscriminator>,
    pub caching: Option<Caching>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityBinding {
    pub id: EntityId,
    pub entity_name: String,
    pub class_name: Option<String>,
    pub super_entity: Option<EntityId>,
    pub sub_entities: Vec<EntityId>,
    pub root: EntityId,
    pub hierarchy: Option<HierarchyDetails>,
    pub primary_table: TableId,
    /// Key columns joining a subclass table to its root table
    pub key_values: Vec<ValueId>,
    /// Declared attributes in declaration order
    pub attributes: IndexMap<String, AttributeId>,
    /// Associations elsewhere that target this entity
    pub inbound: Vec<AttributeId>,
    pub discriminator_value: Option<String>,
    pub lazy: bool,
    pub mutable: bool,
    pub is_abstract: bool,
    pub origin: Origin,
}

impl EntityBinding {
    pub fn is_root(&self) -> bool {
        self.super_entity.is_none()
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeId> {
        self.attributes.get(name).copied()
    }
}
