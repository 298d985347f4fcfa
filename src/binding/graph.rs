//! The binding graph: arenas of entities, attributes, values and tables.

use indexmap::IndexMap;
use serde::Serialize;

use super::attribute::{AttributeBinding, AttributeKind};
use super::entity::{EntityBinding, HierarchyDetails};
use super::registries::Registries;
use super::relational::{Column, RelationalValue, Table};
use super::{AttributeId, EntityId, TableId, ValueId};
use crate::error::{DuplicateKind, MappingError};
use crate::naming::Identifier;

/// Shared output of the binding phases
///
/// Bindings reference each other through ids into the arenas held here. Names
/// are indexed in insertion order so every walk over the graph is
/// deterministic.
#[derive(Debug, Default, Serialize)]
pub struct BindingGraph {
    entities: Vec<EntityBinding>,
    entity_index: IndexMap<String, EntityId>,
    attributes: Vec<AttributeBinding>,
    collections: IndexMap<String, AttributeId>,
    values: Vec<RelationalValue>,
    tables: Vec<Table>,
    table_index: IndexMap<String, TableId>,
    imports: IndexMap<String, String>,
    registries: Registries,
}

impl BindingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- entities ----

    pub fn next_entity_id(&self) -> EntityId {
        EntityId(self.entities.len())
    }

    /// Register an entity built with [`next_entity_id`](Self::next_entity_id).
    pub fn add_entity(&mut self, binding: EntityBinding) -> Result<EntityId, MappingError> {
        if self.entity_index.contains_key(&binding.entity_name) {
            return Err(MappingError::DuplicateMapping {
                kind: DuplicateKind::Entity,
                name: binding.entity_name,
            });
        }
        let id = self.next_entity_id();
        debug_assert_eq!(binding.id, id);
        self.entity_index.insert(binding.entity_name.clone(), id);
        self.entities.push(binding);
        Ok(id)
    }

    pub fn entity(&self, id: EntityId) -> &EntityBinding {
        &self.entities[id.0]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut EntityBinding {
        &mut self.entities[id.0]
    }

    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.entity_index.get(name).copied()
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&EntityBinding> {
        self.entity_id(name).map(|id| self.entity(id))
    }

    pub fn contains_entity(&self, name: &str) -> bool {
        self.entity_index.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityBinding> {
        self.entities.iter()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Roots of every hierarchy, in binding order
    pub fn root_ids(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|entity| entity.is_root())
            .map(|entity| entity.id)
            .collect()
    }

    pub fn hierarchy(&self, id: EntityId) -> Option<&HierarchyDetails> {
        self.entity(self.entity(id).root).hierarchy.as_ref()
    }

    /// Identifier attribute of the hierarchy `id` belongs to
    pub fn identifier_attribute(&self, id: EntityId) -> Option<AttributeId> {
        self.hierarchy(id)
            .and_then(|hierarchy| hierarchy.identifier.as_ref())
            .map(|identifier| identifier.attribute)
    }

    /// Find an attribute by dotted path, searching the supertype chain.
    pub fn find_attribute(&self, entity: EntityId, path: &str) -> Option<AttributeId> {
        let mut segments = path.split('.');
        let first = segments.next()?;

        let mut current = Some(entity);
        let mut found = None;
        while let Some(id) = current {
            let binding = self.entity(id);
            if let Some(attribute) = binding.attribute(first) {
                found = Some(attribute);
                break;
            }
            current = binding.super_entity;
        }

        let mut attribute = found?;
        for segment in segments {
            attribute = match &self.attribute(attribute).kind {
                AttributeKind::Embedded(embedded) => embedded.attributes.get(segment).copied()?,
                _ => return None,
            };
        }
        Some(attribute)
    }

    // ---- attributes ----

    pub fn next_attribute_id(&self) -> AttributeId {
        AttributeId(self.attributes.len())
    }

    /// Store an attribute built with [`next_attribute_id`](Self::next_attribute_id).
    pub fn add_attribute(&mut self, binding: AttributeBinding) -> AttributeId {
        let id = self.next_attribute_id();
        debug_assert_eq!(binding.id, id);
        self.attributes.push(binding);
        id
    }

    pub fn attribute(&self, id: AttributeId) -> &AttributeBinding {
        &self.attributes[id.0]
    }

    pub fn attribute_mut(&mut self, id: AttributeId) -> &mut AttributeBinding {
        &mut self.attributes[id.0]
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeBinding> {
        self.attributes.iter()
    }

    pub fn attribute_ids(&self) -> Vec<AttributeId> {
        (0..self.attributes.len()).map(AttributeId).collect()
    }

    pub fn register_collection(&mut self, role: &str, id: AttributeId) -> Result<(), MappingError> {
        if self.collections.contains_key(role) {
            return Err(MappingError::DuplicateMapping {
                kind: DuplicateKind::Collection,
                name: role.to_string(),
            });
        }
        self.collections.insert(role.to_string(), id);
        Ok(())
    }

    pub fn collection(&self, role: &str) -> Option<&AttributeBinding> {
        self.collections.get(role).map(|id| self.attribute(*id))
    }

    pub fn collection_roles(&self) -> impl Iterator<Item = &String> {
        self.collections.keys()
    }

    // ---- relational model ----

    pub fn add_value(&mut self, value: RelationalValue) -> ValueId {
        let id = ValueId(self.values.len());
        if let Some(table) = value.table() {
            self.tables[table.0].columns.push(id);
        }
        self.values.push(value);
        id
    }

    /// Add a column to `table`, reusing a same-named column already there.
    pub fn add_column(&mut self, table: Option<TableId>, mut column: Column) -> ValueId {
        if let Some(existing) = table.and_then(|table| self.column_named(table, &column.name)) {
            return existing;
        }
        column.table = table;
        self.add_value(RelationalValue::Column(column))
    }

    fn column_named(&self, table: TableId, name: &Identifier) -> Option<ValueId> {
        self.tables[table.0].columns.iter().copied().find(|id| {
            matches!(&self.values[id.0], RelationalValue::Column(c) if &c.name == name)
        })
    }

    /// Move a detached value into `table` and return the value the table holds.
    ///
    /// A detached column whose name is already used in `table` is not moved;
    /// the existing column is returned instead.
    pub fn attach_value(&mut self, value: ValueId, table: TableId) -> ValueId {
        if let RelationalValue::Column(column) = &self.values[value.0] {
            if column.table.is_none() {
                if let Some(existing) = self.column_named(table, &column.name) {
                    return existing;
                }
            }
        }
        let attached = match &mut self.values[value.0] {
            RelationalValue::Column(column) if column.table.is_none() => {
                column.table = Some(table);
                true
            }
            RelationalValue::Derived(derived) if derived.table.is_none() => {
                derived.table = Some(table);
                true
            }
            _ => false,
        };
        if attached {
            self.tables[table.0].columns.push(value);
        }
        value
    }

    pub fn value(&self, id: ValueId) -> &RelationalValue {
        &self.values[id.0]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut RelationalValue {
        &mut self.values[id.0]
    }

    pub fn values(&self) -> impl Iterator<Item = &RelationalValue> {
        self.values.iter()
    }

    pub fn locate_or_create_table(
        &mut self,
        schema: Option<Identifier>,
        catalog: Option<Identifier>,
        name: Identifier,
    ) -> TableId {
        let table = Table {
            id: TableId(self.tables.len()),
            schema,
            catalog,
            name,
            columns: Vec::new(),
            primary_key: Vec::new(),
        };
        let key = table.qualified_name();
        if let Some(existing) = self.table_index.get(&key) {
            return *existing;
        }
        let id = table.id;
        self.table_index.insert(key, id);
        self.tables.push(table);
        id
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.0]
    }

    pub fn table_by_name(&self, qualified_name: &str) -> Option<&Table> {
        self.table_index
            .get(qualified_name)
            .map(|id| self.table(*id))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    // ---- imports and registries ----

    /// Register an explicit import; mapping an alias to another entity is fatal.
    pub fn add_import(&mut self, alias: &str, entity_name: &str) -> Result<(), MappingError> {
        match self.imports.get(alias) {
            Some(existing) if existing != entity_name => Err(MappingError::DuplicateMapping {
                kind: DuplicateKind::Import,
                name: format!("{} -> {} (already {})", alias, entity_name, existing),
            }),
            Some(_) => Ok(()),
            None => {
                self.imports
                    .insert(alias.to_string(), entity_name.to_string());
                Ok(())
            }
        }
    }

    /// Register an automatic import; the first entity claiming an alias keeps it.
    pub fn add_auto_import(&mut self, alias: &str, entity_name: &str) {
        match self.imports.get(alias) {
            Some(existing) if existing != entity_name => {
                tracing::debug!(
                    "Auto-import '{}' already maps to {}, ignoring {}",
                    alias,
                    existing,
                    entity_name
                );
            }
            Some(_) => {}
            None => {
                self.imports
                    .insert(alias.to_string(), entity_name.to_string());
            }
        }
    }

    pub fn import(&self, alias: &str) -> Option<&str> {
        self.imports.get(alias).map(String::as_str)
    }

    pub fn imports(&self) -> &IndexMap<String, String> {
        &self.imports
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn registries_mut(&mut self) -> &mut Registries {
        &mut self.registries
    }
}
