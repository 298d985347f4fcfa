//! Relational model: tables, columns and derived values.

use serde::Serialize;

use super::{TableId, ValueId};
use crate::naming::Identifier;

/// Relational datatype, filled exactly once by a type resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Datatype {
    pub type_code: i32,
    pub type_name: String,
    pub value_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub id: TableId,
    pub schema: Option<Identifier>,
    pub catalog: Option<Identifier>,
    pub name: Identifier,
    pub columns: Vec<ValueId>,
    pub primary_key: Vec<ValueId>,
}

impl Table {
    /// `catalog.schema.name`, leaving out absent parts
    pub fn qualified_name(&self) -> String {
        let mut parts = Vec::new();
        if let Some(catalog) = &self.catalog {
            parts.push(catalog.render());
        }
        if let Some(schema) = &self.schema {
            parts.push(schema.render());
        }
        parts.push(self.name.render());
        parts.join(".")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    /// Owning table; unset for one-to-many keys until associations resolve
    pub table: Option<TableId>,
    pub name: Identifier,
    pub nullable: bool,
    pub unique: bool,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub sql_type: Option<String>,
    pub check: Option<String>,
    pub default_value: Option<String>,
    pub read_fragment: Option<String>,
    pub write_fragment: Option<String>,
    pub datatype: Option<Datatype>,
}

impl Column {
    pub fn new(name: Identifier) -> Self {
        Self {
            table: None,
            name,
            nullable: true,
            unique: false,
            length: None,
            precision: None,
            scale: None,
            sql_type: None,
            check: None,
            default_value: None,
            read_fragment: None,
            write_fragment: None,
            datatype: None,
        }
    }
}

/// Formula-backed value
#[derive(Debug, Clone, Serialize)]
pub struct DerivedValue {
    pub table: Option<TableId>,
    pub expression: String,
    pub datatype: Option<Datatype>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationalValue {
    Column(Column),
    Derived(DerivedValue),
}

impl RelationalValue {
    pub fn datatype(&self) -> Option<&Datatype> {
        match self {
            RelationalValue::Column(column) => column.datatype.as_ref(),
            RelationalValue::Derived(derived) => derived.datatype.as_ref(),
        }
    }

    pub fn table(&self) -> Option<TableId> {
        match self {
            RelationalValue::Column(column) => column.table,
            RelationalValue::Derived(derived) => derived.table,
        }
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            RelationalValue::Column(column) => Some(column),
            RelationalValue::Derived(_) => None,
        }
    }

    /// Fill the datatype unless already set. Returns whether it was applied.
    pub(crate) fn fill_datatype(&mut self, datatype: Datatype) -> bool {
        let slot = match self {
            RelationalValue::Column(column) => &mut column.datatype,
            RelationalValue::Derived(derived) => &mut derived.datatype,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(datatype);
        true
    }
}
