//! The build state machine.
//!
//! Phases run strictly in order. The first five run once per source
//! processor, the resolution passes run once over the whole graph.

use serde::Serialize;
use std::fmt;

use super::processor::{DeclarationProcessor, DocumentProcessor, SourceProcessor};
use super::{Metadata, MetadataSources};
use crate::binder::EntityBinder;
use crate::binding::{AttributeKind, BindingGraph, Caching};
use crate::config::Environment;
use crate::error::{BuildError, MappingError};
use crate::id::{DefaultIdentifierGeneratorFactory, IdentifierGeneratorFactory};
use crate::naming::ObjectNameNormalizer;
use crate::queue::SourceQueue;
use crate::resolve::{
    resolve_associations, resolve_identifier_generators, resolve_types, TypeResolutionReport,
};
use crate::source::SourceFamily;
use crate::types::{BasicType, TypeRegistry};

/// Environment property holding a prefix for every cache region
pub const CACHE_REGION_PREFIX: &str = "cache.region_prefix";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Prepare,
    BindIndependent,
    BindTypeDependent,
    BindMapping,
    BindMappingDependent,
    ResolveAssociations,
    ResolveTypes,
    ResolveIdentifierGenerators,
    Complete,
}

impl BuildPhase {
    pub const ALL: [BuildPhase; 9] = [
        BuildPhase::Prepare,
        BuildPhase::BindIndependent,
        BuildPhase::BindTypeDependent,
        BuildPhase::BindMapping,
        BuildPhase::BindMappingDependent,
        BuildPhase::ResolveAssociations,
        BuildPhase::ResolveTypes,
        BuildPhase::ResolveIdentifierGenerators,
        BuildPhase::Complete,
    ];

    fn position(self) -> usize {
        Self::ALL.iter().position(|phase| *phase == self).unwrap_or(0)
    }

    pub fn next(self) -> Option<BuildPhase> {
        Self::ALL.get(self.position() + 1).copied()
    }

    pub fn previous(self) -> Option<BuildPhase> {
        self.position().checked_sub(1).map(|index| Self::ALL[index])
    }

    /// Whether the phase runs once per source processor
    pub fn is_per_family(self) -> bool {
        self.position() <= BuildPhase::BindMappingDependent.position()
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Prepare => "prepare",
            BuildPhase::BindIndependent => "bind-independent",
            BuildPhase::BindTypeDependent => "bind-type-dependent",
            BuildPhase::BindMapping => "bind-mapping",
            BuildPhase::BindMappingDependent => "bind-mapping-dependent",
            BuildPhase::ResolveAssociations => "resolve-associations",
            BuildPhase::ResolveTypes => "resolve-types",
            BuildPhase::ResolveIdentifierGenerators => "resolve-identifier-generators",
            BuildPhase::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

/// Mutable state threaded through every phase of one build
pub struct BuildContext {
    pub environment: Environment,
    pub normalizer: ObjectNameNormalizer,
    pub type_registry: TypeRegistry,
    pub generator_factory: Box<dyn IdentifierGeneratorFactory>,
    pub graph: BindingGraph,
    pub queue: SourceQueue,
    completed: Vec<BuildPhase>,
    type_report: TypeResolutionReport,
}

impl BuildContext {
    pub fn new(
        environment: Environment,
        type_registry: TypeRegistry,
        generator_factory: Box<dyn IdentifierGeneratorFactory>,
    ) -> Self {
        let normalizer = environment.name_normalizer();
        Self {
            environment,
            normalizer,
            type_registry,
            generator_factory,
            graph: BindingGraph::new(),
            queue: SourceQueue::new(),
            completed: Vec::new(),
            type_report: TypeResolutionReport::default(),
        }
    }

    pub fn completed(&self) -> &[BuildPhase] {
        &self.completed
    }

    fn require(&self, phase: BuildPhase) -> Result<(), MappingError> {
        match phase.previous() {
            Some(required) if !self.completed.contains(&required) => {
                Err(MappingError::PhaseOrder { phase, required })
            }
            _ => Ok(()),
        }
    }

    fn into_metadata(self) -> Metadata {
        Metadata {
            graph: self.graph,
            phases: self.completed,
            processing_order: self.environment.processing_order,
            type_report: self.type_report,
        }
    }
}

/// Run one phase for every processor, then its global work.
pub fn run_phase(
    phase: BuildPhase,
    processors: &mut [Box<dyn SourceProcessor>],
    context: &mut BuildContext,
) -> Result<(), MappingError> {
    context.require(phase)?;
    tracing::debug!("Entering phase {}", phase);

    match phase {
        BuildPhase::Prepare => {
            for processor in processors.iter_mut() {
                processor.prepare(context)?;
            }
        }
        BuildPhase::BindIndependent => {
            for processor in processors.iter_mut() {
                processor.bind_independent(context)?;
            }
        }
        BuildPhase::BindTypeDependent => {
            for processor in processors.iter_mut() {
                processor.bind_type_dependent(context)?;
            }
        }
        BuildPhase::BindMapping => {
            for processor in processors.iter_mut() {
                processor.bind_mapping(context)?;
            }
            let BuildContext {
                graph,
                queue,
                environment,
                normalizer,
                ..
            } = &mut *context;
            let mut binder = EntityBinder::new(graph, environment, normalizer);
            queue.finish(&mut binder)?;
            tracing::info!("Bound {} entities", context.graph.entity_count());
        }
        BuildPhase::BindMappingDependent => {
            for processor in processors.iter_mut() {
                processor.bind_mapping_dependent(context)?;
            }
            if let Some(prefix) = context.environment.properties.get(CACHE_REGION_PREFIX) {
                apply_region_prefix(&mut context.graph, prefix);
            }
        }
        BuildPhase::ResolveAssociations => {
            if context.queue.has_pending() {
                return Err(MappingError::UnresolvedSupertypes {
                    entries: context
                        .queue
                        .extends_queue()
                        .iter()
                        .map(|entry| entry.describe())
                        .collect(),
                });
            }
            resolve_associations(&mut context.graph)?;
        }
        BuildPhase::ResolveTypes => {
            context.type_report = resolve_types(&mut context.graph, &context.type_registry)?;
        }
        BuildPhase::ResolveIdentifierGenerators => {
            resolve_identifier_generators(
                &mut context.graph,
                &context.environment,
                context.generator_factory.as_ref(),
                &context.normalizer,
            )?;
        }
        BuildPhase::Complete => {}
    }

    context.completed.push(phase);
    Ok(())
}

fn prefix_region(caching: &mut Caching, prefix: &str) {
    let prefixed = format!("{}.", prefix);
    if !caching.region.starts_with(&prefixed) {
        caching.region = format!("{}{}", prefixed, caching.region);
    }
}

fn apply_region_prefix(graph: &mut BindingGraph, prefix: &str) {
    for root in graph.root_ids() {
        if let Some(caching) = graph
            .entity_mut(root)
            .hierarchy
            .as_mut()
            .and_then(|hierarchy| hierarchy.caching.as_mut())
        {
            prefix_region(caching, prefix);
        }
    }
    for id in graph.attribute_ids() {
        if let AttributeKind::Plural(plural) = &mut graph.attribute_mut(id).kind {
            if let Some(caching) = plural.caching.as_mut() {
                prefix_region(caching, prefix);
            }
        }
    }
}

/// Builds [`Metadata`] from sources and an environment.
///
/// The type registry and generator factory default to the built-in ones and
/// can be replaced before calling [`MetadataBuilder::build`].
pub struct MetadataBuilder {
    sources: MetadataSources,
    environment: Environment,
    type_registry: TypeRegistry,
    generator_factory: Box<dyn IdentifierGeneratorFactory>,
}

impl MetadataBuilder {
    pub fn new(sources: MetadataSources, environment: Environment) -> Self {
        Self {
            sources,
            environment,
            type_registry: TypeRegistry::new(),
            generator_factory: Box::new(DefaultIdentifierGeneratorFactory::new()),
        }
    }

    /// Register an additional basic type
    pub fn with_type(mut self, basic: BasicType) -> Self {
        self.type_registry.register(basic);
        self
    }

    pub fn with_type_registry(mut self, type_registry: TypeRegistry) -> Self {
        self.type_registry = type_registry;
        self
    }

    pub fn with_generator_factory(mut self, factory: Box<dyn IdentifierGeneratorFactory>) -> Self {
        self.generator_factory = factory;
        self
    }

    /// Run every phase and return the read-only result.
    ///
    /// # Errors
    ///
    /// The first fatal error, tagged with the phase it occurred in
    pub fn build(self) -> Result<Metadata, BuildError> {
        let MetadataBuilder {
            sources,
            environment,
            type_registry,
            generator_factory,
        } = self;
        let (documents, declarations) = sources.into_parts();
        tracing::info!(
            "Building metadata from {} documents and {} declarations ({})",
            documents.len(),
            declarations.len(),
            environment.processing_order
        );

        let mut documents = Some(documents);
        let mut declarations = Some(declarations);
        let mut processors: Vec<Box<dyn SourceProcessor>> = environment
            .processing_order
            .families()
            .into_iter()
            .map(|family| -> Box<dyn SourceProcessor> {
                match family {
                    SourceFamily::Document => Box::new(DocumentProcessor::new(
                        documents.take().unwrap_or_default(),
                    )),
                    SourceFamily::Declaration => Box::new(DeclarationProcessor::new(
                        declarations.take().unwrap_or_default(),
                    )),
                }
            })
            .collect();

        let mut context = BuildContext::new(environment, type_registry, generator_factory);
        for phase in BuildPhase::ALL {
            run_phase(phase, &mut processors, &mut context)
                .map_err(|error| BuildError { phase, error })?;
        }

        tracing::info!(
            "Metadata complete: {} entities, {} collections",
            context.graph.entity_count(),
            context.graph.collection_roles().count()
        );
        Ok(context.into_metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> BuildContext {
        BuildContext::new(
            Environment::default(),
            TypeRegistry::new(),
            Box::new(DefaultIdentifierGeneratorFactory::new()),
        )
    }

    #[test]
    fn test_phase_sequence() {
        assert_eq!(BuildPhase::Prepare.previous(), None);
        assert_eq!(BuildPhase::Prepare.next(), Some(BuildPhase::BindIndependent));
        assert_eq!(BuildPhase::Complete.next(), None);
        assert_eq!(
            BuildPhase::ResolveTypes.previous(),
            Some(BuildPhase::ResolveAssociations)
        );
        assert!(BuildPhase::BindMappingDependent.is_per_family());
        assert!(!BuildPhase::ResolveAssociations.is_per_family());
        assert_eq!(BuildPhase::BindMapping.to_string(), "bind-mapping");
    }

    #[test]
    fn test_phase_out_of_order() {
        let mut context = context();
        let err = run_phase(BuildPhase::ResolveTypes, &mut [], &mut context).unwrap_err();
        assert!(matches!(
            err,
            MappingError::PhaseOrder {
                phase: BuildPhase::ResolveTypes,
                required: BuildPhase::ResolveAssociations,
            }
        ));
        assert!(context.completed().is_empty());
    }

    #[test]
    fn test_empty_build_completes_every_phase() {
        let metadata = MetadataBuilder::new(MetadataSources::new(), Environment::default())
            .build()
            .unwrap();
        assert_eq!(metadata.completed_phases(), &BuildPhase::ALL[..]);
        assert_eq!(metadata.entity_bindings().count(), 0);
    }

    #[test]
    fn test_region_prefix_is_applied_once() {
        let mut caching = Caching {
            access: crate::source::AccessType::ReadWrite,
            region: "com.example.Order".to_string(),
            include_lazy: true,
        };
        prefix_region(&mut caching, "shop");
        prefix_region(&mut caching, "shop");
        assert_eq!(caching.region, "shop.com.example.Order");
    }
}
