//! Per-family source processors.
//!
//! The builder runs each of the first five phases once per processor, in the
//! configured processing order. Global definitions are handled the same way
//! for both families; only the preparation of binding units differs.

use indexmap::IndexMap;

use super::builder::BuildContext;
use crate::binder::EntityBinder;
use crate::binding::registries::replace_with_warning;
use crate::binding::FilterDefinition;
use crate::error::MappingError;
use crate::queue::BindingUnit;
use crate::source::{
    unqualify, DeclaredEntity, MappingDocument, MetadataDefinitions, Origin, ScopeDefaults,
    SourceFamily,
};
use crate::types::TypeDefinition;

/// Phase hooks for one source family
pub trait SourceProcessor {
    fn family(&self) -> SourceFamily;

    /// Global definitions carried by this family's sources, with their origin
    fn definitions(&self) -> Vec<(&Origin, &MetadataDefinitions)>;

    /// Enqueue the family's binding units
    fn prepare(&mut self, context: &mut BuildContext) -> Result<(), MappingError>;

    /// Type definitions and filter definition names
    fn bind_independent(&mut self, context: &mut BuildContext) -> Result<(), MappingError> {
        for (_, definitions) in self.definitions() {
            for source in &definitions.type_definitions {
                let definition = TypeDefinition::from(source);
                context.type_registry.add_definition(definition.clone());
                replace_with_warning(
                    &mut context.graph.registries_mut().type_definitions,
                    "type definition",
                    &source.name,
                    definition,
                );
            }
            for filter in &definitions.filter_definitions {
                replace_with_warning(
                    &mut context.graph.registries_mut().filter_definitions,
                    "filter definition",
                    &filter.name,
                    FilterDefinition::from(filter),
                );
            }
        }
        Ok(())
    }

    /// Filter parameter types and global identifier generator definitions
    fn bind_type_dependent(&mut self, context: &mut BuildContext) -> Result<(), MappingError> {
        let no_parameters = IndexMap::new();
        for (_, definitions) in self.definitions() {
            for filter in &definitions.filter_definitions {
                let registry = &context.type_registry;
                let Some(definition) = context
                    .graph
                    .registries_mut()
                    .filter_definitions
                    .get_mut(&filter.name)
                else {
                    continue;
                };
                for (name, parameter) in definition.parameters.iter_mut() {
                    if parameter.resolved.is_some() {
                        continue;
                    }
                    match registry.heuristic_type(&parameter.type_name, &no_parameters) {
                        Ok(resolved) => parameter.resolved = Some(resolved),
                        Err(err) => tracing::warn!(
                            "Filter {} parameter {} left untyped: {}",
                            filter.name,
                            name,
                            err
                        ),
                    }
                }
            }
            for generator in &definitions.identifier_generators {
                replace_with_warning(
                    &mut context.graph.registries_mut().identifier_generators,
                    "identifier generator",
                    &generator.name,
                    generator.clone(),
                );
            }
        }
        Ok(())
    }

    /// Bind every unit of this family, deferring subtypes of unbound entities
    fn bind_mapping(&mut self, context: &mut BuildContext) -> Result<(), MappingError> {
        let family = self.family();
        let BuildContext {
            graph,
            queue,
            environment,
            normalizer,
            ..
        } = context;
        let mut binder = EntityBinder::new(graph, environment, normalizer);
        let bound = queue.drain(family, &mut binder)?;
        tracing::info!("Bound {} {} units", bound, family);
        Ok(())
    }

    /// Imports, queries, result-set mappings and fetch profiles
    fn bind_mapping_dependent(&mut self, context: &mut BuildContext) -> Result<(), MappingError> {
        for (origin, definitions) in self.definitions() {
            let graph = &mut context.graph;

            for import in &definitions.imports {
                let alias = import
                    .rename
                    .clone()
                    .unwrap_or_else(|| unqualify(&import.class).to_string());
                graph
                    .add_import(&alias, &import.class)
                    .map_err(|e| e.in_origin(origin))?;
            }

            let registries = graph.registries_mut();
            for query in &definitions.named_queries {
                replace_with_warning(&mut registries.named_queries, "named query", &query.name, query.clone());
            }
            for query in &definitions.named_native_queries {
                replace_with_warning(
                    &mut registries.named_native_queries,
                    "named native query",
                    &query.name,
                    query.clone(),
                );
            }
            for mapping in &definitions.result_set_mappings {
                replace_with_warning(
                    &mut registries.result_set_mappings,
                    "result set mapping",
                    &mapping.name,
                    mapping.clone(),
                );
            }

            for profile in &definitions.fetch_profiles {
                for fetch in &profile.fetches {
                    let known = graph.contains_entity(&fetch.entity)
                        || graph
                            .import(&fetch.entity)
                            .is_some_and(|imported| graph.contains_entity(imported));
                    if !known {
                        return Err(MappingError::UnknownFetchProfileEntity {
                            profile: profile.name.clone(),
                            entity: fetch.entity.clone(),
                        }
                        .in_origin(origin));
                    }
                }
                replace_with_warning(
                    &mut graph.registries_mut().fetch_profiles,
                    "fetch profile",
                    &profile.name,
                    profile.clone(),
                );
            }
        }
        Ok(())
    }
}

/// Multi-entity mapping documents
pub struct DocumentProcessor {
    documents: Vec<(Origin, MappingDocument)>,
}

impl DocumentProcessor {
    pub fn new(documents: Vec<(Origin, MappingDocument)>) -> Self {
        Self { documents }
    }
}

impl SourceProcessor for DocumentProcessor {
    fn family(&self) -> SourceFamily {
        SourceFamily::Document
    }

    fn definitions(&self) -> Vec<(&Origin, &MetadataDefinitions)> {
        self.documents
            .iter()
            .map(|(origin, document)| (origin, &document.definitions))
            .collect()
    }

    fn prepare(&mut self, context: &mut BuildContext) -> Result<(), MappingError> {
        for (origin, document) in &self.documents {
            for entity in &document.entities {
                context.queue.enqueue(BindingUnit {
                    family: SourceFamily::Document,
                    origin: origin.clone(),
                    package: document.package.clone(),
                    defaults: document.defaults.clone(),
                    auto_import: document.auto_import,
                    source: entity.clone(),
                });
            }
        }
        tracing::debug!("Prepared {} mapping documents", self.documents.len());
        Ok(())
    }
}

/// Single-entity declarations, bound superclass first
pub struct DeclarationProcessor {
    declarations: Vec<(Origin, DeclaredEntity)>,
}

impl DeclarationProcessor {
    pub fn new(declarations: Vec<(Origin, DeclaredEntity)>) -> Self {
        Self { declarations }
    }
}

impl SourceProcessor for DeclarationProcessor {
    fn family(&self) -> SourceFamily {
        SourceFamily::Declaration
    }

    fn definitions(&self) -> Vec<(&Origin, &MetadataDefinitions)> {
        self.declarations
            .iter()
            .map(|(origin, declared)| (origin, &declared.definitions))
            .collect()
    }

    fn prepare(&mut self, context: &mut BuildContext) -> Result<(), MappingError> {
        for (origin, declared) in &self.declarations {
            context.queue.enqueue(BindingUnit {
                family: SourceFamily::Declaration,
                origin: origin.clone(),
                package: None,
                defaults: ScopeDefaults::default(),
                auto_import: true,
                source: declared.entity.clone(),
            });
        }
        context.queue.order_by_hierarchy(SourceFamily::Declaration)
    }
}
