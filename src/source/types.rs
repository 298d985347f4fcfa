//! Format-agnostic source structures for entity mappings.
//!
//! Mapping documents (YAML, several entities per file) and entity declarations
//! (JSON, one entity each) deserialize into the same [`EntitySource`] tree, so
//! everything downstream of the loaders works against one contract.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

fn default_true() -> bool {
    true
}

/// Where a source came from, used in diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub kind: OriginKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    File,
    Inline,
}

impl Origin {
    pub fn file(path: &Path) -> Self {
        Self {
            kind: OriginKind::File,
            name: path.display().to_string(),
        }
    }

    pub fn inline(name: impl Into<String>) -> Self {
        Self {
            kind: OriginKind::Inline,
            name: name.into(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OriginKind::File => write!(f, "file {}", self.name),
            OriginKind::Inline => write!(f, "inline {}", self.name),
        }
    }
}

/// The two families of mapping sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFamily {
    /// Multi-entity mapping documents
    Document,
    /// Single-entity declarations
    Declaration,
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFamily::Document => write!(f, "document"),
            SourceFamily::Declaration => write!(f, "declaration"),
        }
    }
}

/// Qualify `name` with `package` unless it is already qualified.
pub fn qualify(name: &str, package: Option<&str>) -> String {
    match package {
        Some(package) if !package.is_empty() && !name.contains('.') => {
            format!("{}.{}", package, name)
        }
        _ => name.to_string(),
    }
}

/// Last segment of a dotted name.
pub fn unqualify(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Defaults declared on a scope (document or entity)
///
/// A missing value means "inherit from the enclosing scope".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeDefaults {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub cascade: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub catalog: Option<String>,
}

/// One declared relational column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default)]
    pub sql_type: Option<String>,
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default, rename = "default")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub read: Option<String>,
    #[serde(default)]
    pub write: Option<String>,
}

impl ColumnSource {
    /// Apply every value present in `over` on top of this column.
    pub fn overlay(&self, over: &ColumnSource) -> ColumnSource {
        ColumnSource {
            name: over.name.clone().or_else(|| self.name.clone()),
            nullable: over.nullable.or(self.nullable),
            unique: over.unique || self.unique,
            length: over.length.or(self.length),
            precision: over.precision.or(self.precision),
            scale: over.scale.or(self.scale),
            sql_type: over.sql_type.clone().or_else(|| self.sql_type.clone()),
            check: over.check.clone().or_else(|| self.check.clone()),
            default_value: over
                .default_value
                .clone()
                .or_else(|| self.default_value.clone()),
            read: over.read.clone().or_else(|| self.read.clone()),
            write: over.write.clone().or_else(|| self.write.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaturalIdMutability {
    #[default]
    NotNaturalId,
    Mutable,
    Immutable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyGeneration {
    #[default]
    Never,
    Insert,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStyle {
    Select,
    Join,
    Subselect,
    Batch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundAction {
    #[default]
    Exception,
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionNature {
    #[default]
    Bag,
    Set,
    List,
    Map,
    Array,
}

impl CollectionNature {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionNature::Bag => "bag",
            CollectionNature::Set => "set",
            CollectionNature::List => "list",
            CollectionNature::Map => "map",
            CollectionNature::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceStrategy {
    #[default]
    SingleTable,
    Joined,
    TablePerClass,
}

/// Cache concurrency strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    ReadOnly,
    ReadWrite,
    NonstrictReadWrite,
    Transactional,
}

/// A single cascade kind as written in a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CascadeKind {
    All,
    AllDeleteOrphan,
    None,
    SaveUpdate,
    Persist,
    Merge,
    #[serde(alias = "remove")]
    Delete,
    DeleteOrphan,
    Lock,
    Refresh,
    #[serde(alias = "detach")]
    Evict,
    Replicate,
}

impl CascadeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeKind::All => "all",
            CascadeKind::AllDeleteOrphan => "all-delete-orphan",
            CascadeKind::None => "none",
            CascadeKind::SaveUpdate => "save-update",
            CascadeKind::Persist => "persist",
            CascadeKind::Merge => "merge",
            CascadeKind::Delete => "delete",
            CascadeKind::DeleteOrphan => "delete-orphan",
            CascadeKind::Lock => "lock",
            CascadeKind::Refresh => "refresh",
            CascadeKind::Evict => "evict",
            CascadeKind::Replicate => "replicate",
        }
    }

    /// Parse a comma separated cascade list such as `"save-update, delete"`.
    pub fn parse_list(text: &str) -> Result<Vec<CascadeKind>, String> {
        text.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(CascadeKind::from_str)
            .collect()
    }
}

impl FromStr for CascadeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "all" => Ok(CascadeKind::All),
            "all-delete-orphan" => Ok(CascadeKind::AllDeleteOrphan),
            "none" => Ok(CascadeKind::None),
            "save-update" => Ok(CascadeKind::SaveUpdate),
            "persist" => Ok(CascadeKind::Persist),
            "merge" => Ok(CascadeKind::Merge),
            "delete" | "remove" => Ok(CascadeKind::Delete),
            "delete-orphan" => Ok(CascadeKind::DeleteOrphan),
            "lock" => Ok(CascadeKind::Lock),
            "refresh" => Ok(CascadeKind::Refresh),
            "evict" | "detach" => Ok(CascadeKind::Evict),
            "replicate" => Ok(CascadeKind::Replicate),
            other => Err(format!("unknown cascade style: {}", other)),
        }
    }
}

/// Attribute conversion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSource {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub converter: Option<String>,
}

/// Settings shared by every attribute kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeCommon {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub type_parameters: IndexMap<String, String>,
    /// Type of the value carrier (field or accessor) when known
    #[serde(default)]
    pub value_type: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default = "default_true")]
    pub optimistic_lock: bool,
    #[serde(default)]
    pub natural_id: NaturalIdMutability,
    #[serde(default)]
    pub generation: PropertyGeneration,
    #[serde(default)]
    pub lazy: Option<bool>,
    #[serde(default = "default_true")]
    pub insertable: bool,
    #[serde(default = "default_true")]
    pub updatable: bool,
    #[serde(default)]
    pub conversion: Option<ConversionSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAttributeSource {
    #[serde(flatten)]
    pub common: AttributeCommon,
    #[serde(default)]
    pub columns: Vec<ColumnSource>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub read: Option<String>,
    #[serde(default)]
    pub write: Option<String>,
}

impl BasicAttributeSource {
    /// Whether the attribute carries fragments that need a column of their own
    pub fn has_column_fragments(&self) -> bool {
        self.read.is_some() || self.write.is_some() || self.check.is_some()
    }

    /// The column implied by attribute-level settings
    pub fn implicit_column(&self) -> ColumnSource {
        ColumnSource {
            nullable: self.nullable,
            unique: self.unique,
            length: self.length,
            check: self.check.clone(),
            read: self.read.clone(),
            write: self.write.clone(),
            ..ColumnSource::default()
        }
    }
}

/// Many-to-one or one-to-one association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToOneAttributeSource {
    #[serde(flatten)]
    pub common: AttributeCommon,
    #[serde(default, alias = "entity")]
    pub target: Option<String>,
    #[serde(default)]
    pub property_ref: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSource>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub cascade: Option<Vec<CascadeKind>>,
    #[serde(default)]
    pub fetch: Option<FetchStyle>,
    #[serde(default = "default_true")]
    pub optional: bool,
    #[serde(default)]
    pub orphan_removal: bool,
    #[serde(default)]
    pub not_found: NotFoundAction,
    #[serde(default)]
    pub foreign_key: Option<String>,
}

/// Element side of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluralElementSource {
    Basic {
        #[serde(default, rename = "type")]
        type_name: Option<String>,
        #[serde(default)]
        type_parameters: IndexMap<String, String>,
        #[serde(default)]
        value_type: Option<String>,
        #[serde(default)]
        columns: Vec<ColumnSource>,
        #[serde(default)]
        formula: Option<String>,
    },
    OneToMany {
        #[serde(default, alias = "entity")]
        target: Option<String>,
    },
    ManyToMany {
        #[serde(default, alias = "entity")]
        target: Option<String>,
        #[serde(default)]
        property_ref: Option<String>,
        #[serde(default)]
        columns: Vec<ColumnSource>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluralAttributeSource {
    #[serde(flatten)]
    pub common: AttributeCommon,
    #[serde(default)]
    pub nature: CollectionNature,
    pub element: PluralElementSource,
    #[serde(default)]
    pub key_columns: Vec<ColumnSource>,
    #[serde(default)]
    pub index_column: Option<ColumnSource>,
    #[serde(default)]
    pub table: Option<TableSource>,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub cascade: Option<Vec<CascadeKind>>,
    #[serde(default)]
    pub fetch: Option<FetchStyle>,
    #[serde(default)]
    pub orphan_removal: bool,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub cache: Option<CacheSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedAttributeSource {
    #[serde(flatten)]
    pub common: AttributeCommon,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeSource>,
    /// Column overrides keyed by attribute name relative to this component
    #[serde(default)]
    pub attribute_overrides: IndexMap<String, ColumnSource>,
}

/// One declared attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeSource {
    Basic(BasicAttributeSource),
    ManyToOne(ToOneAttributeSource),
    OneToOne(ToOneAttributeSource),
    Plural(PluralAttributeSource),
    Embedded(EmbeddedAttributeSource),
}

impl AttributeSource {
    pub fn common(&self) -> &AttributeCommon {
        match self {
            AttributeSource::Basic(basic) => &basic.common,
            AttributeSource::ManyToOne(to_one) | AttributeSource::OneToOne(to_one) => {
                &to_one.common
            }
            AttributeSource::Plural(plural) => &plural.common,
            AttributeSource::Embedded(embedded) => &embedded.common,
        }
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }
}

/// Reference to a generator strategy, or to a named global generator definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSource {
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierSource {
    #[serde(flatten)]
    pub attribute: BasicAttributeSource,
    #[serde(default)]
    pub generator: Option<GeneratorSource>,
    #[serde(default)]
    pub unsaved_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorSource {
    #[serde(default)]
    pub column: Option<ColumnSource>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_true")]
    pub insert: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSource {
    #[serde(default)]
    pub usage: Option<AccessType>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_true")]
    pub include_lazy: bool,
}

/// One entity and, for documents, its nested subclasses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySource {
    /// Class name, qualified with the package when unqualified
    pub name: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub table: Option<TableSource>,
    #[serde(default)]
    pub inheritance: Option<InheritanceStrategy>,
    #[serde(default)]
    pub discriminator: Option<DiscriminatorSource>,
    #[serde(default)]
    pub discriminator_value: Option<String>,
    #[serde(default)]
    pub identifier: Option<IdentifierSource>,
    #[serde(default)]
    pub attributes: Vec<AttributeSource>,
    /// Column overrides keyed by full attribute path
    #[serde(default)]
    pub attribute_overrides: IndexMap<String, ColumnSource>,
    #[serde(default)]
    pub defaults: ScopeDefaults,
    #[serde(default)]
    pub subclasses: Vec<EntitySource>,
    #[serde(default = "default_true")]
    pub lazy: bool,
    #[serde(default = "default_true")]
    pub mutable: bool,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub cache: Option<CacheSource>,
}

impl EntitySource {
    pub fn class_name(&self, package: Option<&str>) -> String {
        qualify(&self.name, package)
    }

    /// Explicit entity name, else the qualified class name
    pub fn qualified_name(&self, package: Option<&str>) -> String {
        match &self.entity_name {
            Some(entity_name) => entity_name.clone(),
            None => self.class_name(package),
        }
    }

    /// Every entity name declared by this source, nested subclasses included
    pub fn declared_names(&self, package: Option<&str>) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(package, &mut names);
        names
    }

    fn collect_names(&self, package: Option<&str>, out: &mut Vec<String>) {
        out.push(self.qualified_name(package));
        for sub in &self.subclasses {
            sub.collect_names(package, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinitionSource {
    pub name: String,
    /// Name of the type this definition specializes
    pub implementation: String,
    #[serde(default)]
    pub registration_keys: Vec<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinitionSource {
    pub name: String,
    #[serde(default)]
    pub condition: Option<String>,
    /// Parameter name to type name
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorDefinitionSource {
    pub name: String,
    pub strategy: String,
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSource {
    pub class: String,
    #[serde(default)]
    pub rename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedQuerySource {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub cacheable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedNativeQuerySource {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub result_set_mapping: Option<String>,
}

/// Result-set mapping, passed through without interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSetMappingSource {
    pub name: String,
    #[serde(flatten)]
    pub definition: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSource {
    pub entity: String,
    pub association: String,
    #[serde(default = "default_fetch_style")]
    pub style: FetchStyle,
}

fn default_fetch_style() -> FetchStyle {
    FetchStyle::Join
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchProfileSource {
    pub name: String,
    #[serde(default)]
    pub fetches: Vec<FetchSource>,
}

/// Global definitions either source family can carry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDefinitions {
    #[serde(default)]
    pub type_definitions: Vec<TypeDefinitionSource>,
    #[serde(default)]
    pub filter_definitions: Vec<FilterDefinitionSource>,
    #[serde(default)]
    pub identifier_generators: Vec<GeneratorDefinitionSource>,
    #[serde(default)]
    pub imports: Vec<ImportSource>,
    #[serde(default)]
    pub named_queries: Vec<NamedQuerySource>,
    #[serde(default)]
    pub named_native_queries: Vec<NamedNativeQuerySource>,
    #[serde(default)]
    pub result_set_mappings: Vec<ResultSetMappingSource>,
    #[serde(default)]
    pub fetch_profiles: Vec<FetchProfileSource>,
}

/// A multi-entity mapping document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub defaults: ScopeDefaults,
    #[serde(default = "default_true")]
    pub auto_import: bool,
    #[serde(default)]
    pub entities: Vec<EntitySource>,
    #[serde(flatten)]
    pub definitions: MetadataDefinitions,
}

/// A single-entity declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredEntity {
    #[serde(flatten)]
    pub entity: EntitySource,
    #[serde(flatten)]
    pub definitions: MetadataDefinitions,
}
