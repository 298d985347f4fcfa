//! Build orchestration and the read-only result of a build.

pub mod builder;
pub mod processor;

use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

use crate::binding::{
    AttributeBinding, AttributeId, BindingGraph, EntityBinding, Registries, RelationalValue,
    Table, TableId, ValueId,
};
use crate::config::ProcessingOrder;
use crate::error::MappingError;
use crate::resolve::TypeResolutionReport;
use crate::source::{DeclaredEntity, MappingDocument, NamedQuerySource, Origin};

pub use builder::{run_phase, BuildContext, BuildPhase, MetadataBuilder, CACHE_REGION_PREFIX};
pub use processor::{DeclarationProcessor, DocumentProcessor, SourceProcessor};

/// Every source handed to one build, each tagged with its origin
#[derive(Debug, Clone, Default)]
pub struct MetadataSources {
    documents: Vec<(Origin, MappingDocument)>,
    declarations: Vec<(Origin, DeclaredEntity)>,
}

impl MetadataSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every mapping file in a directory
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self, MappingError> {
        crate::source::load_sources(dir)
    }

    pub fn add_document(&mut self, origin: Origin, document: MappingDocument) {
        self.documents.push((origin, document));
    }

    pub fn add_declaration(&mut self, origin: Origin, declared: DeclaredEntity) {
        self.declarations.push((origin, declared));
    }

    pub fn documents(&self) -> &[(Origin, MappingDocument)] {
        &self.documents
    }

    pub fn declarations(&self) -> &[(Origin, DeclaredEntity)] {
        &self.declarations
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.declarations.is_empty()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Vec<(Origin, MappingDocument)>, Vec<(Origin, DeclaredEntity)>) {
        (self.documents, self.declarations)
    }
}

/// Fully bound and resolved metadata
#[derive(Debug, Serialize)]
pub struct Metadata {
    pub(crate) graph: BindingGraph,
    pub(crate) phases: Vec<BuildPhase>,
    pub(crate) processing_order: ProcessingOrder,
    pub(crate) type_report: TypeResolutionReport,
}

impl Metadata {
    /// Look up an entity by entity name or import alias
    pub fn entity_binding(&self, name: &str) -> Option<&EntityBinding> {
        self.graph.entity_by_name(name).or_else(|| {
            self.graph
                .import(name)
                .and_then(|imported| self.graph.entity_by_name(imported))
        })
    }

    pub fn entity_bindings(&self) -> impl Iterator<Item = &EntityBinding> {
        self.graph.entities()
    }

    /// Look up a collection by role, `<entity name>.<attribute path>`
    pub fn collection_binding(&self, role: &str) -> Option<&AttributeBinding> {
        self.graph.collection(role)
    }

    pub fn collection_roles(&self) -> impl Iterator<Item = &String> {
        self.graph.collection_roles()
    }

    pub fn attribute(&self, id: AttributeId) -> &AttributeBinding {
        self.graph.attribute(id)
    }

    /// Find an attribute by entity and dotted path, searching supertypes
    pub fn attribute_binding(&self, entity: &str, path: &str) -> Option<&AttributeBinding> {
        let entity = self.entity_binding(entity)?;
        self.graph
            .find_attribute(entity.id, path)
            .map(|id| self.graph.attribute(id))
    }

    pub fn table(&self, id: TableId) -> &Table {
        self.graph.table(id)
    }

    pub fn value(&self, id: ValueId) -> &RelationalValue {
        self.graph.value(id)
    }

    pub fn imports(&self) -> &IndexMap<String, String> {
        self.graph.imports()
    }

    pub fn import(&self, alias: &str) -> Option<&str> {
        self.graph.import(alias)
    }

    /// Named queries, filters, fetch profiles and the other global definitions
    pub fn registries(&self) -> &Registries {
        self.graph.registries()
    }

    pub fn named_query(&self, name: &str) -> Option<&NamedQuerySource> {
        self.graph.registries().named_queries.get(name)
    }

    pub fn graph(&self) -> &BindingGraph {
        &self.graph
    }

    pub fn completed_phases(&self) -> &[BuildPhase] {
        &self.phases
    }

    pub fn processing_order(&self) -> ProcessingOrder {
        self.processing_order
    }

    /// Attributes whose type could not be determined
    pub fn unresolved_types(&self) -> &[String] {
        &self.type_report.unresolved
    }

    pub fn type_report(&self) -> &TypeResolutionReport {
        &self.type_report
    }
}
