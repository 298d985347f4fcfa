//! Wires textual association targets to bound entities and attributes.

use crate::binding::{AttributeId, AttributeKind, BindingGraph, EntityId, PluralElement};
use crate::error::MappingError;
use crate::source::qualify;

/// Find an association target: as written, through the imports, then
/// qualified with the owning entity's package.
fn lookup_entity(graph: &BindingGraph, name: &str, owner_class: Option<&str>) -> Option<EntityId> {
    if let Some(id) = graph.entity_id(name) {
        return Some(id);
    }
    if let Some(id) = graph.import(name).and_then(|imported| graph.entity_id(imported)) {
        return Some(id);
    }
    let package = owner_class.and_then(|class| class.rsplit_once('.').map(|(package, _)| package));
    package.and_then(|package| graph.entity_id(&qualify(name, Some(package))))
}

/// What resolving one association produced
struct Resolution {
    entity: EntityId,
    attribute: AttributeId,
    domain_type: String,
}

fn resolve_one(graph: &BindingGraph, id: AttributeId) -> Result<Option<Resolution>, MappingError> {
    let attribute = graph.attribute(id);
    let target = match attribute.association_target() {
        Some(target) if !target.is_resolved() => target,
        _ => return Ok(None),
    };
    let owner = graph.entity(attribute.entity);

    let referenced = target.referenced_entity_name.as_deref().ok_or_else(|| {
        MappingError::MissingReferencedEntityName {
            entity: owner.entity_name.clone(),
            attribute: attribute.path.clone(),
        }
    })?;

    let entity = lookup_entity(graph, referenced, owner.class_name.as_deref()).ok_or_else(|| {
        MappingError::UnknownEntity {
            entity: owner.entity_name.clone(),
            attribute: attribute.path.clone(),
            target: referenced.to_string(),
        }
    })?;

    let referenced_attribute = match target.referenced_attribute_name.as_deref() {
        Some(name) => graph.find_attribute(entity, name),
        None => graph.identifier_attribute(entity),
    };
    let target_binding = graph.entity(entity);
    let referenced_attribute = referenced_attribute.ok_or_else(|| MappingError::UnknownAttribute {
        entity: owner.entity_name.clone(),
        attribute: attribute.path.clone(),
        target: target_binding.entity_name.clone(),
        referenced: target
            .referenced_attribute_name
            .clone()
            .unwrap_or_else(|| "<identifier>".to_string()),
    })?;

    Ok(Some(Resolution {
        entity,
        attribute: referenced_attribute,
        domain_type: target_binding
            .class_name
            .clone()
            .unwrap_or_else(|| target_binding.entity_name.clone()),
    }))
}

/// Resolve every to-one attribute and association-typed collection element.
///
/// Already resolved associations are left alone, so a second run changes
/// nothing. Returns how many associations were resolved.
pub fn resolve_associations(graph: &mut BindingGraph) -> Result<usize, MappingError> {
    let mut resolved = 0;

    for id in graph.attribute_ids() {
        let origin = &graph.attribute(id).origin;
        let Some(resolution) = resolve_one(graph, id).map_err(|e| e.in_origin(origin))? else {
            continue;
        };

        let binding = graph.attribute_mut(id);
        if let Some(target) = binding.association_target_mut() {
            target.resolved_entity = Some(resolution.entity);
            target.resolved_attribute = Some(resolution.attribute);
        }
        if matches!(binding.kind, AttributeKind::ToOne(_)) && binding.domain_type.is_none() {
            binding.domain_type = Some(resolution.domain_type);
        }

        // one-to-many keys live in the element's table
        let detached = match &binding.kind {
            AttributeKind::Plural(plural) if matches!(plural.element, PluralElement::OneToMany { .. }) => {
                Some((plural.key_values.clone(), plural.index_value))
            }
            _ => None,
        };
        if let Some((key_values, index_value)) = detached {
            let table = graph.entity(resolution.entity).primary_table;
            let key_values: Vec<_> = key_values
                .into_iter()
                .map(|value| graph.attach_value(value, table))
                .collect();
            let index_value = index_value.map(|value| graph.attach_value(value, table));
            if let AttributeKind::Plural(plural) = &mut graph.attribute_mut(id).kind {
                plural.key_values = key_values;
                plural.index_value = index_value;
            }
        }

        graph.attribute_mut(resolution.attribute).inbound.push(id);
        graph.entity_mut(resolution.entity).inbound.push(id);
        resolved += 1;
    }

    tracing::info!("Resolved {} associations", resolved);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::EntityBinder;
    use crate::config::Environment;
    use crate::queue::BindingUnit;
    use crate::source::{MappingDocument, Origin, SourceFamily};

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
        graph
    }

    const SHOP: &str = r#"
package: com.example
entities:
  - name: Customer
    identifier:
      name: id
      type: long
    attributes:
      - kind: basic
        name: email
      - kind: plural
        name: orders
        element:
          kind: one_to_many
          target: Order
  - name: Order
    table:
      name: orders
    identifier:
      name: id
      type: long
    attributes:
      - kind: many_to_one
        name: customer
        target: Customer
      - kind: many_to_one
        name: contact
        target: com.example.Customer
        property_ref: email
"#;

    #[test]
    fn test_association_symmetry() {
        let mut graph = bind(SHOP);
        assert_eq!(resolve_associations(&mut graph).unwrap(), 3);

        let customer = graph.entity_by_name("com.example.Customer").unwrap();
        let order = graph.entity_by_name("com.example.Order").unwrap();
        let customer_id = graph.identifier_attribute(customer.id).unwrap();
        let link = order.attribute("customer").unwrap();

        let to_one = graph.attribute(link).as_to_one().unwrap();
        assert_eq!(to_one.target.resolved_entity, Some(customer.id));
        assert_eq!(to_one.target.resolved_attribute, Some(customer_id));
        assert!(graph.attribute(customer_id).inbound.contains(&link));
        assert!(customer.inbound.contains(&link));
        assert_eq!(
            graph.attribute(link).domain_type.as_deref(),
            Some("com.example.Customer")
        );

        let contact = order.attribute("contact").unwrap();
        let email = customer.attribute("email").unwrap();
        assert_eq!(
            graph.attribute(contact).association_target().unwrap().resolved_attribute,
            Some(email)
        );
        assert_eq!(graph.attribute(email).inbound, vec![contact]);
    }

    #[test]
    fn test_one_to_many_key_attached_to_target_table() {
        let mut graph = bind(SHOP);
        resolve_associations(&mut graph).unwrap();
        let orders = graph.collection("com.example.Customer.orders").unwrap();
        let key = orders.as_plural().unwrap().key_values[0];
        let order_table = graph.entity_by_name("com.example.Order").unwrap().primary_table;
        assert_eq!(graph.value(key).table(), Some(order_table));
        assert!(graph.table(order_table).columns.contains(&key));
    }

    #[test]
    fn test_bidirectional_key_shares_many_to_one_column() {
        let mut graph = bind(
            r#"
package: com.example
entities:
  - name: Customer
    identifier:
      name: id
      type: long
    attributes:
      - kind: plural
        name: orders
        inverse: true
        key_columns:
          - name: customer_id
        element:
          kind: one_to_many
          target: Order
  - name: Order
    table:
      name: orders
    identifier:
      name: id
      type: long
    attributes:
      - kind: many_to_one
        name: customer
        target: Customer
        columns:
          - name: customer_id
"#,
        );
        resolve_associations(&mut graph).unwrap();

        let order = graph.entity_by_name("com.example.Order").unwrap();
        let names: Vec<String> = graph
            .table(order.primary_table)
            .columns
            .iter()
            .filter_map(|id| graph.value(*id).as_column())
            .map(|column| column.name.render())
            .collect();
        assert_eq!(names, vec!["id", "customer_id"]);

        let link = graph.attribute(order.attribute("customer").unwrap());
        let orders = graph.collection("com.example.Customer.orders").unwrap();
        assert_eq!(orders.as_plural().unwrap().key_values, link.values);
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let mut graph = bind(SHOP);
        resolve_associations(&mut graph).unwrap();
        assert_eq!(resolve_associations(&mut graph).unwrap(), 0);
        let customer = graph.entity_by_name("com.example.Customer").unwrap();
        assert_eq!(customer.inbound.len(), 2);
    }

    #[test]
    fn test_unknown_entity_names_both_sides() {
        let mut graph = bind(
            r#"
entities:
  - name: com.example.Order
    attributes:
      - kind: many_to_one
        name: warehouse
        target: com.example.Warehouse
"#,
        );
        let err = resolve_associations(&mut graph).unwrap_err();
        assert!(err.to_string().contains("inline shop.yaml"));
        assert_eq!(
            err.innermost().to_string(),
            "association com.example.Order.warehouse refers to unknown entity: com.example.Warehouse"
        );
    }

    #[test]
    fn test_missing_target_name() {
        let mut graph = bind(
            r#"
entities:
  - name: com.example.Order
    attributes:
      - kind: many_to_one
        name: customer
"#,
        );
        let err = resolve_associations(&mut graph).unwrap_err();
        assert!(matches!(
            err.innermost(),
            MappingError::MissingReferencedEntityName { .. }
        ));
    }

    #[test]
    fn test_unknown_referenced_attribute() {
        let mut graph = bind(
            r#"
package: com.example
entities:
  - name: Customer
    identifier:
      name: id
  - name: Order
    attributes:
      - kind: many_to_one
        name: customer
        target: Customer
        property_ref: code
"#,
        );
        let err = resolve_associations(&mut graph).unwrap_err();
        match err.innermost() {
            MappingError::UnknownAttribute { target, referenced, .. } => {
                assert_eq!(target, "com.example.Customer");
                assert_eq!(referenced, "code");
            }
            other => panic!("unexpected error {}", other),
        }
    }
}
