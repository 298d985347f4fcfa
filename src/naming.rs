//! Naming strategies and identifier quoting for relational object names.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::source::unqualify;

/// A possibly quoted relational identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub text: String,
    pub quoted: bool,
}

impl Identifier {
    pub fn new(text: impl Into<String>, quoted: bool) -> Self {
        Self {
            text: text.into(),
            quoted,
        }
    }

    /// Rendered form, double-quoted when quoting applies
    pub fn render(&self) -> String {
        if self.quoted {
            format!("\"{}\"", self.text)
        } else {
            self.text.clone()
        }
    }

    /// Whether `name` carries explicit backtick or double-quote quoting
    pub fn is_explicitly_quoted(name: &str) -> bool {
        name.len() >= 2
            && ((name.starts_with('`') && name.ends_with('`'))
                || (name.starts_with('"') && name.ends_with('"')))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Derives table and column names from entity and attribute names
pub trait NamingStrategy: fmt::Debug + Send + Sync {
    /// Table name for an entity class without an explicit table
    fn class_to_table_name(&self, class_name: &str) -> String;

    /// Column name for an attribute without an explicit column
    fn property_to_column_name(&self, property_path: &str) -> String;

    /// Adjust an explicitly given table name
    fn table_name(&self, table_name: &str) -> String;

    /// Adjust an explicitly given column name
    fn column_name(&self, column_name: &str) -> String;

    /// Name of the table backing a collection without an explicit table
    fn collection_table_name(&self, owner_table: &str, property_path: &str) -> String;

    /// Foreign key column of an association without explicit columns
    fn foreign_key_column_name(&self, property_path: &str, referenced_column: &str) -> String;

    /// Collection key column pointing back at the owning entity
    fn join_key_column_name(&self, owner_entity: &str, owner_id_column: &str) -> String;
}

/// Keeps names as written
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamingStrategy;

impl NamingStrategy for DefaultNamingStrategy {
    fn class_to_table_name(&self, class_name: &str) -> String {
        unqualify(class_name).to_string()
    }

    fn property_to_column_name(&self, property_path: &str) -> String {
        unqualify(property_path).to_string()
    }

    fn table_name(&self, table_name: &str) -> String {
        table_name.to_string()
    }

    fn column_name(&self, column_name: &str) -> String {
        column_name.to_string()
    }

    fn collection_table_name(&self, owner_table: &str, property_path: &str) -> String {
        format!("{}_{}", owner_table, unqualify(property_path))
    }

    fn foreign_key_column_name(&self, property_path: &str, referenced_column: &str) -> String {
        format!("{}_{}", unqualify(property_path), referenced_column)
    }

    fn join_key_column_name(&self, owner_entity: &str, owner_id_column: &str) -> String {
        format!("{}_{}", unqualify(owner_entity), owner_id_column)
    }
}

/// Converts mixed-case names to snake_case
#[derive(Debug, Clone, Copy, Default)]
pub struct ImprovedNamingStrategy;

impl NamingStrategy for ImprovedNamingStrategy {
    fn class_to_table_name(&self, class_name: &str) -> String {
        unqualify(class_name).to_case(Case::Snake)
    }

    fn property_to_column_name(&self, property_path: &str) -> String {
        unqualify(property_path).to_case(Case::Snake)
    }

    fn table_name(&self, table_name: &str) -> String {
        table_name.to_case(Case::Snake)
    }

    fn column_name(&self, column_name: &str) -> String {
        column_name.to_case(Case::Snake)
    }

    fn collection_table_name(&self, owner_table: &str, property_path: &str) -> String {
        format!(
            "{}_{}",
            owner_table.to_case(Case::Snake),
            unqualify(property_path).to_case(Case::Snake)
        )
    }

    fn foreign_key_column_name(&self, property_path: &str, referenced_column: &str) -> String {
        format!(
            "{}_{}",
            unqualify(property_path).to_case(Case::Snake),
            referenced_column.to_case(Case::Snake)
        )
    }

    fn join_key_column_name(&self, owner_entity: &str, owner_id_column: &str) -> String {
        format!(
            "{}_{}",
            unqualify(owner_entity).to_case(Case::Snake),
            owner_id_column.to_case(Case::Snake)
        )
    }
}

/// Selectable naming strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategyKind {
    #[default]
    Default,
    Improved,
}

impl NamingStrategyKind {
    pub fn build(self) -> Arc<dyn NamingStrategy> {
        match self {
            NamingStrategyKind::Default => Arc::new(DefaultNamingStrategy),
            NamingStrategyKind::Improved => Arc::new(ImprovedNamingStrategy),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "default" => Some(NamingStrategyKind::Default),
            "improved" => Some(NamingStrategyKind::Improved),
            _ => None,
        }
    }
}

/// Applies the naming strategy and quoting rules to relational names
#[derive(Debug, Clone)]
pub struct ObjectNameNormalizer {
    naming: Arc<dyn NamingStrategy>,
    globally_quoted: bool,
}

impl ObjectNameNormalizer {
    pub fn new(naming: Arc<dyn NamingStrategy>, globally_quoted: bool) -> Self {
        Self {
            naming,
            globally_quoted,
        }
    }

    pub fn naming_strategy(&self) -> &dyn NamingStrategy {
        self.naming.as_ref()
    }

    pub fn is_globally_quoted(&self) -> bool {
        self.globally_quoted
    }

    /// Strip explicit quoting, or apply global quoting.
    pub fn normalize_identifier_quoting(&self, name: &str) -> Identifier {
        if Identifier::is_explicitly_quoted(name) {
            Identifier::new(&name[1..name.len() - 1], true)
        } else {
            Identifier::new(name, self.globally_quoted)
        }
    }

    /// Table name from an explicit name, or from `implicit` through the naming strategy.
    ///
    /// Explicitly quoted names bypass the naming strategy.
    pub fn normalize_table_name<F>(&self, explicit: Option<&str>, implicit: F) -> Identifier
    where
        F: FnOnce(&dyn NamingStrategy) -> String,
    {
        match explicit {
            Some(name) if Identifier::is_explicitly_quoted(name) => {
                self.normalize_identifier_quoting(name)
            }
            Some(name) => self.normalize_identifier_quoting(&self.naming.table_name(name)),
            None => self.normalize_identifier_quoting(&implicit(self.naming.as_ref())),
        }
    }

    pub fn normalize_column_name<F>(&self, explicit: Option<&str>, implicit: F) -> Identifier
    where
        F: FnOnce(&dyn NamingStrategy) -> String,
    {
        match explicit {
            Some(name) if Identifier::is_explicitly_quoted(name) => {
                self.normalize_identifier_quoting(name)
            }
            Some(name) => self.normalize_identifier_quoting(&self.naming.column_name(name)),
            None => self.normalize_identifier_quoting(&implicit(self.naming.as_ref())),
        }
    }

    /// Normalize a schema or catalog name, which only gets quoting applied
    pub fn normalize_database_identifier(&self, name: Option<&str>) -> Option<Identifier> {
        name.map(|name| self.normalize_identifier_quoting(name))
    }
}

impl Default for ObjectNameNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(DefaultNamingStrategy), false)
    }
}
