//! Creates the identifier generator of every hierarchy root.

use indexmap::IndexMap;

use crate::binding::{AttributeKind, BindingGraph, EntityId};
use crate::config::Environment;
use crate::error::MappingError;
use crate::id::{
    GeneratorConfig, GeneratorError, IdentifierGeneratorBinding, IdentifierGeneratorFactory,
    CATALOG, ENTITY_NAME, PREFER_POOLED_LO, PROPERTY, SCHEMA, TARGET_COLUMN, TARGET_TABLE,
};
use crate::naming::ObjectNameNormalizer;

/// Strategy used when neither the entity nor a named definition picks one
pub const DEFAULT_STRATEGY: &str = "assigned";

/// Merge generator parameters, later layers winning:
/// environment properties, engine defaults, the named definition, the entity.
fn generator_parameters(
    graph: &BindingGraph,
    environment: &Environment,
    root: EntityId,
) -> Result<(String, IndexMap<String, String>), GeneratorError> {
    let entity = graph.entity(root);
    let identifier = entity
        .hierarchy
        .as_ref()
        .and_then(|hierarchy| hierarchy.identifier.as_ref());
    let source = identifier.and_then(|identifier| identifier.generator_source.as_ref());

    let mut parameters = environment.properties.clone();
    parameters
        .entry(PREFER_POOLED_LO.to_string())
        .or_insert_with(|| "false".to_string());

    let mut strategy = None;
    if let Some(name) = source.and_then(|source| source.name.as_deref()) {
        let definition = graph
            .registries()
            .identifier_generators
            .get(name)
            .ok_or_else(|| GeneratorError::UnknownDefinition {
                name: name.to_string(),
            })?;
        parameters.extend(definition.parameters.clone());
        strategy = Some(definition.strategy.clone());
    }
    if let Some(source) = source {
        parameters.extend(source.parameters.clone());
        if let Some(explicit) = &source.strategy {
            strategy = Some(explicit.clone());
        }
    }

    let table = graph.table(entity.primary_table);
    let column = identifier
        .and_then(|identifier| graph.attribute(identifier.attribute).values.first())
        .and_then(|value| graph.value(*value).as_column())
        .map(|column| column.name.render());

    let derived = [
        (ENTITY_NAME, Some(entity.entity_name.clone())),
        (TARGET_TABLE, Some(table.name.render())),
        (TARGET_COLUMN, column),
        (SCHEMA, table.schema.as_ref().map(|schema| schema.render())),
        (CATALOG, table.catalog.as_ref().map(|catalog| catalog.render())),
    ];
    for (key, value) in derived {
        if let Some(value) = value {
            parameters.entry(key.to_string()).or_insert(value);
        }
    }

    Ok((
        strategy.unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
        parameters,
    ))
}

/// A foreign generator's property must be a to-one attribute of the root
fn check_foreign_property(
    graph: &BindingGraph,
    root: EntityId,
    parameters: &IndexMap<String, String>,
) -> Result<(), GeneratorError> {
    let property = parameters.get(PROPERTY).cloned().unwrap_or_default();
    let is_to_one = graph
        .find_attribute(root, &property)
        .map(|attribute| matches!(graph.attribute(attribute).kind, AttributeKind::ToOne(_)))
        .unwrap_or(false);
    if is_to_one {
        Ok(())
    } else {
        Err(GeneratorError::ForeignPropertyNotFound { property })
    }
}

/// Instantiate identifier generators for every root without one.
///
/// Subclasses share their root's generator and are never processed.
pub fn resolve_identifier_generators(
    graph: &mut BindingGraph,
    environment: &Environment,
    factory: &dyn IdentifierGeneratorFactory,
    normalizer: &ObjectNameNormalizer,
) -> Result<(), MappingError> {
    for root in graph.root_ids() {
        resolve_root(graph, environment, factory, normalizer, root)
            .map_err(|e| e.in_origin(&graph.entity(root).origin))?;
    }
    Ok(())
}

fn resolve_root(
    graph: &mut BindingGraph,
    environment: &Environment,
    factory: &dyn IdentifierGeneratorFactory,
    normalizer: &ObjectNameNormalizer,
    root: EntityId,
) -> Result<(), MappingError> {
    let entity_name = graph.entity(root).entity_name.clone();
    let Some(identifier) = graph
        .entity(root)
        .hierarchy
        .as_ref()
        .and_then(|hierarchy| hierarchy.identifier.as_ref())
    else {
        return Ok(());
    };
    if identifier.generator.is_some() {
        return Ok(());
    }

    let identifier_type = graph
        .attribute(identifier.attribute)
        .type_descriptor
        .resolved()
        .cloned()
        .ok_or_else(|| MappingError::MissingIdentifierType {
            entity: entity_name.clone(),
        })?;

    let wrap = |source: GeneratorError| MappingError::IdentifierGenerator {
        entity: entity_name.clone(),
        source,
    };

    let (strategy, parameters) = generator_parameters(graph, environment, root).map_err(wrap)?;
    if strategy == "foreign" && parameters.contains_key(PROPERTY) {
        check_foreign_property(graph, root, &parameters).map_err(wrap)?;
    }

    let config = GeneratorConfig {
        entity_name: &entity_name,
        identifier_type: &identifier_type,
        parameters: &parameters,
        normalizer,
    };
    let generator = factory
        .create_identifier_generator(&strategy, &config)
        .map_err(wrap)?;
    tracing::debug!("Identifier generator for {}: {}", entity_name, strategy);

    let binding = IdentifierGeneratorBinding::new(&strategy, parameters.clone(), generator);
    if let Some(identifier) = graph
        .entity_mut(root)
        .hierarchy
        .as_mut()
        .and_then(|hierarchy| hierarchy.identifier.as_mut())
    {
        identifier.generator = Some(binding);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::EntityBinder;
    use crate::id::{DefaultIdentifierGeneratorFactory, OptimizerKind};
    use crate::queue::BindingUnit;
    use crate::resolve::{resolve_associations, resolve_types};
    use crate::source::{GeneratorDefinitionSource, MappingDocument, Origin, SourceFamily};
    use crate::types::TypeRegistry;

    fn build(yaml: &str, environment: &Environment) -> Result<BindingGraph, MappingError> {
        let document: MappingDocument = serde_yaml::from_str(yaml).unwrap();
        let normalizer = environment.name_normalizer();
        let mut graph = BindingGraph::new();
        for definition in &document.definitions.identifier_generators {
            graph
                .registries_mut()
                .identifier_generators
                .insert(definition.name.clone(), definition.clone());
        }
        {
            let mut binder = EntityBinder::new(&mut graph, environment, &normalizer);
            for entity in &document.entities {
                binder.bind_unit(&BindingUnit {
                    family: SourceFamily::Document,
                    origin: Origin::inline("ids.yaml"),
                    package: document.package.clone(),
                    defaults: document.defaults.clone(),
                    auto_import: document.auto_import,
                    source: entity.clone(),
                })?;
            }
        }
        resolve_associations(&mut graph)?;
        resolve_types(&mut graph, &TypeRegistry::new())?;
        resolve_identifier_generators(
            &mut graph,
            environment,
            &DefaultIdentifierGeneratorFactory::new(),
            &normalizer,
        )?;
        Ok(graph)
    }

    fn generator<'g>(graph: &'g BindingGraph, entity: &str) -> &'g IdentifierGeneratorBinding {
        let entity = graph.entity_by_name(entity).unwrap();
        entity
            .hierarchy
            .as_ref()
            .unwrap()
            .identifier
            .as_ref()
            .unwrap()
            .generator
            .as_ref()
            .unwrap()
    }

    #[test]
    fn test_parameter_layers() {
        let mut environment = Environment::default();
        environment
            .properties
            .insert("increment_size".to_string(), "10".to_string());
        let graph = build(
            r#"
defaults:
  schema: shop
identifier_generators:
  - name: order_seq
    strategy: sequence
    parameters:
      sequence_name: order_sequence
      increment_size: "20"
entities:
  - name: com.example.Order
    table:
      name: orders
    identifier:
      name: id
      type: long
      generator:
        name: order_seq
        parameters:
          increment_size: "50"
    subclasses:
      - name: com.example.RushOrder
"#,
            &environment,
        )
        .unwrap();

        let binding = generator(&graph, "com.example.Order");
        assert_eq!(binding.strategy, "sequence");
        assert_eq!(binding.parameters["increment_size"], "50");
        assert_eq!(binding.parameters[PREFER_POOLED_LO], "false");
        assert_eq!(binding.parameters[ENTITY_NAME], "com.example.Order");
        assert_eq!(binding.parameters[TARGET_TABLE], "orders");
        assert_eq!(binding.parameters[TARGET_COLUMN], "id");
        assert_eq!(binding.parameters[SCHEMA], "shop");
        assert_eq!(binding.optimizer, OptimizerKind::Pooled);
        assert_eq!(binding.database_objects, vec!["shop.order_sequence".to_string()]);

        let rush = graph.entity_by_name("com.example.RushOrder").unwrap();
        assert!(rush.hierarchy.is_none());
    }

    #[test]
    fn test_default_strategy_is_assigned() {
        let graph = build(
            r#"
entities:
  - name: com.example.Tag
    identifier:
      name: code
      type: string
"#,
            &Environment::default(),
        )
        .unwrap();
        assert_eq!(generator(&graph, "com.example.Tag").strategy, "assigned");
    }

    #[test]
    fn test_strategy_type_mismatch() {
        let err = build(
            r#"
entities:
  - name: com.example.Tag
    identifier:
      name: code
      type: string
      generator:
        strategy: identity
"#,
            &Environment::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("inline ids.yaml"));
        match err.innermost() {
            MappingError::IdentifierGenerator { entity, source } => {
                assert_eq!(entity, "com.example.Tag");
                assert!(matches!(source, GeneratorError::IncompatibleType { .. }));
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_unknown_definition_and_strategy() {
        let err = build(
            r#"
entities:
  - name: com.example.Tag
    identifier:
      name: id
      type: long
      generator:
        name: missing
"#,
            &Environment::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.innermost(),
            MappingError::IdentifierGenerator {
                source: GeneratorError::UnknownDefinition { .. },
                ..
            }
        ));

        let err = build(
            r#"
entities:
  - name: com.example.Tag
    identifier:
      name: id
      type: long
      generator:
        strategy: hilo
"#,
            &Environment::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.innermost(),
            MappingError::IdentifierGenerator {
                source: GeneratorError::UnknownStrategy { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_foreign_property_must_be_to_one() {
        let yaml = r#"
package: com.example
entities:
  - name: Person
    identifier:
      name: id
      type: long
  - name: Passport
    identifier:
      name: id
      type: long
      generator:
        strategy: foreign
        parameters:
          property: PROPERTY_NAME
    attributes:
      - kind: basic
        name: number
      - kind: one_to_one
        name: owner
        target: Person
        optional: false
"#;
        let graph = build(&yaml.replace("PROPERTY_NAME", "owner"), &Environment::default()).unwrap();
        assert_eq!(generator(&graph, "com.example.Passport").strategy, "foreign");

        let err = build(&yaml.replace("PROPERTY_NAME", "number"), &Environment::default()).unwrap_err();
        assert!(matches!(
            err.innermost(),
            MappingError::IdentifierGenerator {
                source: GeneratorError::ForeignPropertyNotFound { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_existing_generator_is_kept() {
        let mut graph = build(
            r#"
entities:
  - name: com.example.Tag
    identifier:
      name: id
      type: long
      generator:
        strategy: increment
"#,
            &Environment::default(),
        )
        .unwrap();
        graph
            .registries_mut()
            .identifier_generators
            .insert(
                "unused".to_string(),
                GeneratorDefinitionSource {
                    name: "unused".to_string(),
                    strategy: "uuid".to_string(),
                    parameters: IndexMap::new(),
                },
            );
        let environment = Environment::default();
        resolve_identifier_generators(
            &mut graph,
            &environment,
            &DefaultIdentifierGeneratorFactory::new(),
            &environment.name_normalizer(),
        )
        .unwrap();
        assert_eq!(generator(&graph, "com.example.Tag").strategy, "increment");
    }
}
