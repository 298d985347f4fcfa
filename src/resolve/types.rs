//! Heuristic type resolution and push-down to relational values.
//!
//! Basic attributes, components, collections and discriminators resolve in a
//! first sub-pass. Associations then copy the type of the attribute they
//! reference, and key columns take the type of the identifier they join on.

use serde::Serialize;

use crate::binding::{
    AttributeId, AttributeKind, BindingGraph, Datatype, EntityId, PluralElement, TypeDescriptor,
    ValueId,
};
use crate::error::MappingError;
use crate::types::{ResolvedType, TypeCategory, TypeRegistry};

/// Outcome of one type resolution run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeResolutionReport {
    /// Attributes and discriminators resolved by this run
    pub resolved: usize,
    /// `entity.path` of attributes still without a type
    pub unresolved: Vec<String>,
}

/// Try the explicit type name, the value-carrier type, then the domain type.
///
/// Returns the names tried when nothing matches.
fn heuristic(
    registry: &TypeRegistry,
    descriptor: &TypeDescriptor,
    domain_type: Option<&str>,
) -> Result<ResolvedType, Vec<String>> {
    let candidates = [
        descriptor.explicit_type_name.as_deref(),
        descriptor.value_type_name.as_deref(),
        domain_type,
    ];
    let mut tried = Vec::new();
    for name in candidates.into_iter().flatten() {
        match registry.heuristic_type(name, &descriptor.type_parameters) {
            Ok(resolved) => return Ok(resolved),
            Err(err) => {
                tracing::debug!("Type lookup for {} failed: {}", name, err);
                tried.push(name.to_string());
            }
        }
    }
    Err(tried)
}

fn fill_single(graph: &mut BindingGraph, values: &[ValueId], datatype: Option<Datatype>) {
    if let ([value], Some(datatype)) = (values, datatype) {
        graph.value_mut(*value).fill_datatype(datatype);
    }
}

/// Set an attribute's type and push it down; false when it already had one
fn apply(graph: &mut BindingGraph, id: AttributeId, resolved: ResolvedType) -> bool {
    let datatype = resolved.datatype();
    let value_type = resolved.value_type.clone();
    let attribute = graph.attribute_mut(id);
    if !attribute.type_descriptor.resolve(resolved) {
        return false;
    }
    let singular = !matches!(attribute.kind, AttributeKind::Plural(_));
    if singular && attribute.domain_type.is_none() {
        attribute.domain_type = Some(value_type);
    }
    let values = attribute.values.clone();
    fill_single(graph, &values, datatype);
    true
}

fn describe(graph: &BindingGraph, id: AttributeId) -> String {
    let attribute = graph.attribute(id);
    format!("{}.{}", graph.entity(attribute.entity).entity_name, attribute.path)
}

/// Datatype of the identifier of the hierarchy `entity` belongs to
fn identifier_datatype(graph: &BindingGraph, entity: EntityId) -> Option<Datatype> {
    let identifier = graph.identifier_attribute(entity)?;
    graph
        .attribute(identifier)
        .type_descriptor
        .resolved()
        .and_then(ResolvedType::datatype)
}

fn resolve_discriminators(
    graph: &mut BindingGraph,
    registry: &TypeRegistry,
    report: &mut TypeResolutionReport,
) -> Option<MappingError> {
    let mut failure = None;
    for root in graph.root_ids() {
        let entity_name = graph.entity(root).entity_name.clone();
        let Some(discriminator) = graph
            .entity_mut(root)
            .hierarchy
            .as_mut()
            .and_then(|hierarchy| hierarchy.discriminator.as_mut())
        else {
            continue;
        };
        if discriminator.type_descriptor.is_resolved() {
            continue;
        }

        match heuristic(registry, &discriminator.type_descriptor, None) {
            Ok(resolved) => {
                let datatype = resolved.datatype();
                let value = discriminator.value;
                discriminator.type_descriptor.resolve(resolved);
                fill_single(graph, &[value], datatype);
                report.resolved += 1;
            }
            Err(_) => {
                let type_name = discriminator
                    .type_descriptor
                    .explicit_type_name
                    .clone()
                    .unwrap_or_default();
                let origin = graph.entity(root).origin.clone();
                failure.get_or_insert(
                    MappingError::UnresolvedDiscriminatorType {
                        entity: entity_name,
                        type_name,
                    }
                    .in_origin(&origin),
                );
            }
        }
    }
    failure
}

/// Basic attributes, components, collections and basic collection elements
fn resolve_direct(graph: &mut BindingGraph, registry: &TypeRegistry, report: &mut TypeResolutionReport) {
    for id in graph.attribute_ids() {
        let attribute = graph.attribute(id);
        let resolved = match &attribute.kind {
            AttributeKind::ToOne(_) => continue,
            _ if attribute.type_descriptor.is_resolved() => None,
            AttributeKind::Basic => {
                match heuristic(registry, &attribute.type_descriptor, attribute.domain_type.as_deref()) {
                    Ok(resolved) => Some(resolved),
                    Err(tried) => {
                        tracing::debug!(
                            "Could not resolve type of {} (tried: {})",
                            describe(graph, id),
                            tried.join(", ")
                        );
                        None
                    }
                }
            }
            AttributeKind::Embedded(embedded) => Some(ResolvedType {
                name: embedded.class.clone().unwrap_or_else(|| attribute.path.clone()),
                category: TypeCategory::Component {
                    class: embedded.class.clone(),
                },
                sql_type: None,
                value_type: embedded
                    .class
                    .clone()
                    .unwrap_or_else(|| "component".to_string()),
                parameters: Default::default(),
            }),
            AttributeKind::Plural(plural) => Some(ResolvedType {
                name: plural.nature.as_str().to_string(),
                category: TypeCategory::Collection {
                    role: plural.role.clone(),
                },
                sql_type: None,
                value_type: plural.nature.as_str().to_string(),
                parameters: Default::default(),
            }),
        };

        if let Some(resolved) = resolved {
            if apply(graph, id, resolved) {
                report.resolved += 1;
            }
        }
        resolve_element(graph, registry, id);
    }
}

fn resolve_element(graph: &mut BindingGraph, registry: &TypeRegistry, id: AttributeId) {
    let role = describe(graph, id);
    let AttributeKind::Plural(plural) = &mut graph.attribute_mut(id).kind else {
        return;
    };
    let PluralElement::Basic {
        type_descriptor,
        values,
        ..
    } = &mut plural.element
    else {
        return;
    };
    if type_descriptor.is_resolved() {
        return;
    }
    match heuristic(registry, type_descriptor, None) {
        Ok(resolved) => {
            let datatype = resolved.datatype();
            type_descriptor.resolve(resolved);
            let values = values.clone();
            fill_single(graph, &values, datatype);
        }
        Err(tried) => {
            tracing::debug!(
                "Could not resolve element type of {} (tried: {})",
                role,
                tried.join(", ")
            );
        }
    }
}

/// Copy the referenced attribute's type onto an unresolved to-one
fn resolve_to_one(graph: &mut BindingGraph, id: AttributeId) -> bool {
    let attribute = graph.attribute(id);
    let AttributeKind::ToOne(to_one) = &attribute.kind else {
        return false;
    };
    if attribute.type_descriptor.is_resolved() {
        return false;
    }
    let (Some(entity), Some(target)) =
        (to_one.target.resolved_entity, to_one.target.resolved_attribute)
    else {
        return false;
    };
    let Some(target_type) = graph.attribute(target).type_descriptor.resolved() else {
        return false;
    };
    let entity_name = graph.entity(entity).entity_name.clone();
    let resolved = ResolvedType {
        name: entity_name.clone(),
        category: TypeCategory::Entity {
            entity_name: entity_name.clone(),
        },
        sql_type: target_type.sql_type,
        value_type: attribute.domain_type.clone().unwrap_or(entity_name),
        parameters: target_type.parameters.clone(),
    };
    let datatype = target_type.datatype();
    let values = attribute.values.clone();
    graph.attribute_mut(id).type_descriptor.resolve(resolved);
    fill_single(graph, &values, datatype);
    true
}

/// Associations and key columns, from the types resolved so far
fn resolve_dependent(graph: &mut BindingGraph, report: &mut TypeResolutionReport) {
    // a to-one may reference another to-one, so sweep until nothing changes
    loop {
        let mut progressed = false;
        for id in graph.attribute_ids() {
            if resolve_to_one(graph, id) {
                report.resolved += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    for id in graph.attribute_ids() {
        let attribute = graph.attribute(id);
        let AttributeKind::Plural(plural) = &attribute.kind else {
            continue;
        };
        let key_values = plural.key_values.clone();
        let element = match &plural.element {
            PluralElement::ManyToMany { target, values } => {
                target.resolved_entity.map(|entity| (entity, values.clone()))
            }
            _ => None,
        };
        let owner = identifier_datatype(graph, attribute.entity);
        fill_single(graph, &key_values, owner);
        if let Some((entity, values)) = element {
            let target = identifier_datatype(graph, entity);
            fill_single(graph, &values, target);
        }
    }

    for entity in graph.entities().map(|entity| entity.id).collect::<Vec<_>>() {
        let key_values = graph.entity(entity).key_values.clone();
        if !key_values.is_empty() {
            let datatype = identifier_datatype(graph, entity);
            fill_single(graph, &key_values, datatype);
        }
    }
}

/// Resolve attribute and discriminator types.
///
/// Attributes that stay unresolved are reported, not fatal. An unresolved
/// identifier or discriminator fails the run once every attribute had its
/// chance. Types that are already resolved are never replaced.
pub fn resolve_types(
    graph: &mut BindingGraph,
    registry: &TypeRegistry,
) -> Result<TypeResolutionReport, MappingError> {
    let mut report = TypeResolutionReport::default();

    let discriminator_failure = resolve_discriminators(graph, registry, &mut report);
    resolve_direct(graph, registry, &mut report);
    resolve_dependent(graph, &mut report);

    report.unresolved = graph
        .attributes()
        .filter(|attribute| !attribute.type_descriptor.is_resolved())
        .map(|attribute| describe(graph, attribute.id))
        .collect();

    for root in graph.root_ids() {
        let Some(identifier) = graph.identifier_attribute(root) else {
            continue;
        };
        let attribute = graph.attribute(identifier);
        if !attribute.type_descriptor.is_resolved() {
            let descriptor = &attribute.type_descriptor;
            let tried: Vec<&str> = [
                descriptor.explicit_type_name.as_deref(),
                descriptor.value_type_name.as_deref(),
                attribute.domain_type.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect();
            let entity = graph.entity(root);
            return Err(MappingError::UnresolvedIdentifierType {
                entity: entity.entity_name.clone(),
                tried: tried.join(", "),
            }
            .in_origin(&entity.origin));
        }
    }

    if let Some(failure) = discriminator_failure {
        return Err(failure);
    }

    tracing::info!(
        "Resolved {} types, {} attributes left unresolved",
        report.resolved,
        report.unresolved.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::EntityBinder;
    use crate::config::Environment;
    use crate::queue::BindingUnit;
    use crate::resolve::resolve_associations;
    use crate::source::{MappingDocument, Origin, SourceFamily};
    use crate::types::SqlType;

    fn bind(yaml: &str) -> BindingGraph {
        let document: MappingDocument = serde_yaml::from_str(yaml).unwrap();
        let environment = Environment::default();
        let normalizer = environment.name_normalizer();
        let mut graph = BindingGraph::new();
        {
            let mut binder = EntityBinder::new(&mut graph, &environment, &normalizer);
            for entity in &document.entities {
                binder
                    .bind_unit(&BindingUnit {
                        family: SourceFamily::Document,
                        origin: Origin::inline("shop.yaml"),
                        package: document.package.clone(),
                        defaults: document.defaults.clone(),
                        auto_import: document.auto_import,
                        source: entity.clone(),
                    })
                    .unwrap();
            }
        }
        resolve_associations(&mut graph).unwrap();
        graph
    }

    const SHOP: &str = r#"
package: com.example
entities:
  - name: Customer
    discriminator:
      type: char
    identifier:
      name: id
      type: long
    attributes:
      - kind: basic
        name: email
        type: varchar(120)
      - kind: basic
        name: balance
        value_type: java.math.BigDecimal
        type: decimal(10,2)
      - kind: basic
        name: nickname
        value_type: String
      - kind: basic
        name: avatar
        value_type: com.example.Image
      - kind: plural
        name: tags
        element:
          kind: basic
          type: string
    subclasses:
      - name: Business
        discriminator_value: B
  - name: Order
    inheritance: joined
    identifier:
      name: id
      type: integer
    attributes:
      - kind: many_to_one
        name: customer
        target: Customer
    subclasses:
      - name: RushOrder
"#;

    fn attribute<'g>(graph: &'g BindingGraph, entity: &str, path: &str) -> &'g crate::binding::AttributeBinding {
        let entity = graph.entity_by_name(entity).unwrap();
        graph.attribute(graph.find_attribute(entity.id, path).unwrap())
    }

    fn datatype(graph: &BindingGraph, value: ValueId) -> Option<&Datatype> {
        graph.value(value).datatype()
    }

    #[test]
    fn test_basic_types_and_push_down() {
        let mut graph = bind(SHOP);
        let report = resolve_types(&mut graph, &TypeRegistry::new()).unwrap();

        let email = attribute(&graph, "com.example.Customer", "email");
        let resolved = email.type_descriptor.resolved().unwrap();
        assert_eq!(resolved.parameter("length"), Some("120"));
        assert_eq!(email.domain_type.as_deref(), Some("String"));
        assert_eq!(
            datatype(&graph, email.values[0]).unwrap().type_code,
            SqlType::Varchar.code()
        );

        let balance = attribute(&graph, "com.example.Customer", "balance");
        let resolved = balance.type_descriptor.resolved().unwrap();
        assert_eq!(resolved.parameter("precision"), Some("10"));
        assert_eq!(resolved.parameter("scale"), Some("2"));
        assert_eq!(
            balance.type_descriptor.value_type_name.as_deref(),
            Some("java.math.BigDecimal")
        );

        let nickname = attribute(&graph, "com.example.Customer", "nickname");
        assert_eq!(nickname.type_descriptor.resolved().unwrap().name, "string");

        assert_eq!(report.unresolved, vec!["com.example.Customer.avatar".to_string()]);
    }

    #[test]
    fn test_association_and_key_types() {
        let mut graph = bind(SHOP);
        resolve_types(&mut graph, &TypeRegistry::new()).unwrap();

        let customer = attribute(&graph, "com.example.Order", "customer");
        let resolved = customer.type_descriptor.resolved().unwrap();
        assert_eq!(
            resolved.category,
            TypeCategory::Entity {
                entity_name: "com.example.Customer".to_string()
            }
        );
        assert_eq!(
            datatype(&graph, customer.values[0]).unwrap().type_code,
            SqlType::BigInt.code()
        );

        let tags = graph.collection("com.example.Customer.tags").unwrap().as_plural().unwrap();
        assert_eq!(
            datatype(&graph, tags.key_values[0]).unwrap().type_code,
            SqlType::BigInt.code()
        );
        match &tags.element {
            PluralElement::Basic { values, .. } => assert_eq!(
                datatype(&graph, values[0]).unwrap().type_code,
                SqlType::Varchar.code()
            ),
            other => panic!("unexpected element {:?}", other),
        }

        let rush = graph.entity_by_name("com.example.RushOrder").unwrap();
        assert_eq!(
            datatype(&graph, rush.key_values[0]).unwrap().type_code,
            SqlType::Integer.code()
        );
    }

    #[test]
    fn test_discriminator_type() {
        let mut graph = bind(SHOP);
        resolve_types(&mut graph, &TypeRegistry::new()).unwrap();
        let customer = graph.entity_by_name("com.example.Customer").unwrap();
        let discriminator = customer.hierarchy.as_ref().unwrap().discriminator.as_ref().unwrap();
        assert_eq!(
            discriminator.type_descriptor.resolved().unwrap().sql_type,
            Some(SqlType::Char)
        );
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let mut graph = bind(SHOP);
        resolve_types(&mut graph, &TypeRegistry::new()).unwrap();
        let before = serde_json::to_value(&graph).unwrap();
        let report = resolve_types(&mut graph, &TypeRegistry::new()).unwrap();
        assert_eq!(report.resolved, 0);
        assert_eq!(serde_json::to_value(&graph).unwrap(), before);
    }

    #[test]
    fn test_unresolved_identifier_is_fatal() {
        let mut graph = bind(
            r#"
entities:
  - name: com.example.Widget
    identifier:
      name: id
      type: no_such_type
"#,
        );
        let err = resolve_types(&mut graph, &TypeRegistry::new()).unwrap_err();
        assert!(err.to_string().starts_with("invalid mapping in inline shop.yaml"));
        match err.innermost() {
            MappingError::UnresolvedIdentifierType { entity, tried } => {
                assert_eq!(entity, "com.example.Widget");
                assert_eq!(tried, "no_such_type");
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_unresolved_discriminator_is_fatal() {
        let mut graph = bind(
            r#"
entities:
  - name: com.example.Widget
    discriminator:
      type: colour
    identifier:
      name: id
      type: long
"#,
        );
        let err = resolve_types(&mut graph, &TypeRegistry::new()).unwrap_err();
        assert!(matches!(
            err.innermost(),
            MappingError::UnresolvedDiscriminatorType { type_name, .. } if type_name == "colour"
        ));
    }

    #[test]
    fn test_chained_to_one_resolves_regardless_of_order() {
        let mut graph = bind(
            r#"
package: com.example
entities:
  - name: Shipment
    identifier:
      name: id
      type: long
    attributes:
      - kind: many_to_one
        name: order_customer
        target: Order
        property_ref: customer
  - name: Order
    identifier:
      name: id
      type: long
    attributes:
      - kind: many_to_one
        name: customer
        target: Customer
  - name: Customer
    identifier:
      name: code
      type: string
"#,
        );
        let report = resolve_types(&mut graph, &TypeRegistry::new()).unwrap();
        assert!(report.unresolved.is_empty());

        let chained = attribute(&graph, "com.example.Shipment", "order_customer");
        assert_eq!(
            chained.type_descriptor.resolved().unwrap().category,
            TypeCategory::Entity {
                entity_name: "com.example.Order".to_string()
            }
        );
        assert_eq!(
            datatype(&graph, chained.values[0]).unwrap().type_code,
            SqlType::Varchar.code()
        );
    }
}
