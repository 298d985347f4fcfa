//! Per-source binder.
//!
//! Turns one entity source into graph entries using only what the source
//! itself says plus the already bound supertype. Cross references to other
//! entities stay textual until the association pass.

mod association;
mod attribute;
pub mod defaults;

use indexmap::IndexMap;

use crate::binding::{
    AttributeContainer, AttributeId, AttributeKind, BindingGraph, Caching, Column,
    DerivedValue, EntityBinding, EntityDiscriminator, EntityId, EntityIdentifier,
    HierarchyDetails, RelationalValue, TableId, TypeDescriptor, ValueId,
};
use crate::config::Environment;
use crate::error::{DuplicateKind, MappingError};
use crate::naming::ObjectNameNormalizer;
use crate::queue::{supertype_candidates, BindingUnit, UnitBinder};
use crate::source::{
    unqualify, CacheSource, ColumnSource, DiscriminatorSource, EntitySource, IdentifierSource,
    InheritanceStrategy, Origin, SourceFamily,
};

pub use defaults::DefaultsStack;

/// Default discriminator column name
pub const DEFAULT_DISCRIMINATOR_COLUMN: &str = "DTYPE";

/// Binds entity sources into a [`BindingGraph`]
pub struct EntityBinder<'a> {
    graph: &'a mut BindingGraph,
    environment: &'a Environment,
    normalizer: &'a ObjectNameNormalizer,
}

/// Context shared by the entities of one binding unit
struct UnitContext<'u> {
    family: SourceFamily,
    origin: &'u Origin,
    package: Option<&'u str>,
    auto_import: bool,
}

/// Where attributes are being bound: entity or component, with override lookup
#[derive(Clone)]
pub(crate) struct AttributeScope<'s> {
    family: SourceFamily,
    entity: EntityId,
    entity_name: &'s str,
    container: AttributeContainer,
    path_prefix: Option<String>,
    table: TableId,
    defaults: &'s DefaultsStack,
    origin: &'s Origin,
    /// Overrides keyed by full path, declared on the entity
    entity_overrides: &'s IndexMap<String, ColumnSource>,
    /// Overrides keyed by relative name, declared on the enclosing component
    local_overrides: Option<&'s IndexMap<String, ColumnSource>>,
}

impl<'s> AttributeScope<'s> {
    fn path(&self, name: &str) -> String {
        match &self.path_prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        }
    }

    fn override_for(&self, path: &str, name: &str) -> Option<&'s ColumnSource> {
        self.entity_overrides
            .get(path)
            .or_else(|| self.local_overrides.and_then(|local| local.get(name)))
    }
}

impl UnitBinder for EntityBinder<'_> {
    fn is_bound(&self, entity_name: &str) -> bool {
        self.graph.contains_entity(entity_name)
    }

    fn bind(&mut self, unit: &BindingUnit) -> Result<(), MappingError> {
        self.bind_unit(unit).map(|_| ())
    }
}

impl<'a> EntityBinder<'a> {
    pub fn new(
        graph: &'a mut BindingGraph,
        environment: &'a Environment,
        normalizer: &'a ObjectNameNormalizer,
    ) -> Self {
        Self {
            graph,
            environment,
            normalizer,
        }
    }

    pub fn graph(&self) -> &BindingGraph {
        self.graph
    }

    /// Bind a unit and its nested subclasses.
    ///
    /// The unit's supertype must already be bound.
    pub fn bind_unit(&mut self, unit: &BindingUnit) -> Result<EntityId, MappingError> {
        let defaults = DefaultsStack::new(self.environment.root_defaults()).nested(&unit.defaults);
        let supertype = match unit.supertype() {
            Some(name) => Some(self.lookup_supertype(unit, name)?),
            None => None,
        };
        let context = UnitContext {
            family: unit.family,
            origin: &unit.origin,
            package: unit.package.as_deref(),
            auto_import: unit.auto_import,
        };
        self.bind_entity(&context, &unit.source, supertype, &defaults)
    }

    fn lookup_supertype(&self, unit: &BindingUnit, name: &str) -> Result<EntityId, MappingError> {
        supertype_candidates(name, unit.package.as_deref())
            .iter()
            .find_map(|candidate| self.graph.entity_id(candidate))
            .ok_or_else(|| MappingError::UnboundSupertype {
                entity: unit.entity_name(),
                supertype: name.to_string(),
            })
    }

    fn bind_entity(
        &mut self,
        context: &UnitContext<'_>,
        source: &EntitySource,
        supertype: Option<EntityId>,
        enclosing: &DefaultsStack,
    ) -> Result<EntityId, MappingError> {
        let defaults = enclosing.nested(&source.defaults);
        let entity_name = source.qualified_name(context.package);
        let class_name = source.class_name(context.package);
        let id = self.graph.next_entity_id();

        let (root, strategy) = match supertype {
            Some(super_id) => (
                self.graph.entity(super_id).root,
                self.graph
                    .hierarchy(super_id)
                    .map(|hierarchy| hierarchy.strategy)
                    .unwrap_or_default(),
            ),
            None => (id, source.inheritance.unwrap_or_default()),
        };

        let primary_table = match supertype {
            Some(super_id) if strategy == InheritanceStrategy::SingleTable => {
                self.graph.entity(super_id).primary_table
            }
            _ => self.bind_table(source, &class_name, &defaults),
        };

        self.graph.add_entity(EntityBinding {
            id,
            entity_name: entity_name.clone(),
            class_name: Some(class_name),
            super_entity: supertype,
            sub_entities: Vec::new(),
            root,
            hierarchy: None,
            primary_table,
            key_values: Vec::new(),
            attributes: IndexMap::new(),
            inbound: Vec::new(),
            discriminator_value: source.discriminator_value.clone(),
            lazy: source.lazy,
            mutable: source.mutable,
            is_abstract: source.is_abstract,
            origin: context.origin.clone(),
        })?;
        if let Some(super_id) = supertype {
            self.graph.entity_mut(super_id).sub_entities.push(id);
        }
        tracing::debug!("Binding entity {} from {}", entity_name, context.origin);

        let scope = AttributeScope {
            family: context.family,
            entity: id,
            entity_name: &entity_name,
            container: AttributeContainer::Entity(id),
            path_prefix: None,
            table: primary_table,
            defaults: &defaults,
            origin: context.origin,
            entity_overrides: &source.attribute_overrides,
            local_overrides: None,
        };

        match supertype {
            None => {
                let hierarchy = self.bind_hierarchy(&scope, source, strategy)?;
                self.graph.entity_mut(id).hierarchy = Some(hierarchy);
            }
            Some(_) if strategy != InheritanceStrategy::SingleTable => {
                self.bind_subclass_key(id, root, primary_table);
            }
            Some(_) => {}
        }

        let has_discriminator = self
            .graph
            .hierarchy(id)
            .map(|hierarchy| hierarchy.discriminator.is_some())
            .unwrap_or(false);
        if has_discriminator && source.discriminator_value.is_none() {
            self.graph.entity_mut(id).discriminator_value = Some(entity_name.clone());
        }

        for attribute in &source.attributes {
            self.bind_attribute(&scope, attribute)?;
        }

        if context.auto_import {
            self.graph.add_auto_import(&entity_name, &entity_name);
            self.graph.add_auto_import(unqualify(&entity_name), &entity_name);
        }

        for sub in &source.subclasses {
            self.bind_entity(context, sub, Some(id), &defaults)?;
        }

        Ok(id)
    }

    fn bind_table(
        &mut self,
        source: &EntitySource,
        class_name: &str,
        defaults: &DefaultsStack,
    ) -> TableId {
        let table = source.table.clone().unwrap_or_default();
        let schema = table.schema.as_deref().or(defaults.schema());
        let catalog = table.catalog.as_deref().or(defaults.catalog());
        let name = self
            .normalizer
            .normalize_table_name(table.name.as_deref(), |naming| {
                naming.class_to_table_name(class_name)
            });
        let schema = self.normalizer.normalize_database_identifier(schema);
        let catalog = self.normalizer.normalize_database_identifier(catalog);
        self.graph.locate_or_create_table(schema, catalog, name)
    }

    fn bind_hierarchy(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &EntitySource,
        strategy: InheritanceStrategy,
    ) -> Result<HierarchyDetails, MappingError> {
        let identifier = match &source.identifier {
            Some(identifier) => Some(self.bind_identifier(scope, identifier)?),
            None => {
                tracing::warn!("Entity {} declares no identifier", scope.entity_name);
                None
            }
        };

        let discriminator = match &source.discriminator {
            Some(discriminator) => Some(self.bind_discriminator(scope, discriminator)?),
            None => None,
        };

        Ok(HierarchyDetails {
            strategy,
            identifier,
            discriminator,
            caching: self.bind_caching(source.cache.as_ref(), scope.entity_name),
        })
    }

    fn bind_identifier(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &IdentifierSource,
    ) -> Result<EntityIdentifier, MappingError> {
        let attribute = self.bind_basic(scope, &source.attribute, true)?;
        self.register_attribute(scope, attribute)?;

        let key: Vec<ValueId> = self.graph.attribute(attribute).values.clone();
        self.graph.table_mut(scope.table).primary_key = key;

        Ok(EntityIdentifier {
            attribute,
            generator_source: source.generator.clone(),
            unsaved_value: source.unsaved_value.clone(),
            generator: None,
        })
    }

    fn bind_discriminator(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &DiscriminatorSource,
    ) -> Result<EntityDiscriminator, MappingError> {
        let value = match (&source.formula, &source.column) {
            (Some(_), Some(_)) => {
                return Err(MappingError::ColumnAndFormula {
                    entity: scope.entity_name.to_string(),
                    attribute: "discriminator".to_string(),
                })
            }
            (Some(formula), None) => self.graph.add_value(RelationalValue::Derived(DerivedValue {
                table: Some(scope.table),
                expression: formula.clone(),
                datatype: None,
            })),
            (None, column) => {
                let column = column.clone().unwrap_or_default();
                self.create_column(Some(scope.table), &column, false, |_| {
                    DEFAULT_DISCRIMINATOR_COLUMN.to_string()
                })
            }
        };

        Ok(EntityDiscriminator {
            type_descriptor: TypeDescriptor::explicit(source.type_name.as_deref().unwrap_or("string")),
            value,
            forced: source.force,
            inserted: source.insert,
        })
    }

    fn bind_caching(&self, cache: Option<&CacheSource>, region: &str) -> Option<Caching> {
        let cache = cache?;
        match cache.usage.or(self.environment.default_cache_access) {
            Some(access) => Some(Caching {
                access,
                region: cache.region.clone().unwrap_or_else(|| region.to_string()),
                include_lazy: cache.include_lazy,
            }),
            None => {
                tracing::warn!(
                    "Cache for {} declares no usage and no default cache access is configured",
                    region
                );
                None
            }
        }
    }

    /// Key columns of a joined or union subclass table, mirroring the root identifier
    fn bind_subclass_key(&mut self, entity: EntityId, root: EntityId, table: TableId) {
        let root_key = self.graph.table(self.graph.entity(root).primary_table).primary_key.clone();
        let mut key = Vec::with_capacity(root_key.len());
        for value in root_key {
            if let Some(root_column) = self.graph.value(value).as_column() {
                let mut column = Column::new(root_column.name.clone());
                column.nullable = false;
                key.push(self.graph.add_column(Some(table), column));
            }
        }
        self.graph.table_mut(table).primary_key = key.clone();
        self.graph.entity_mut(entity).key_values = key;
    }

    /// Create a column from its source, naming it through `implicit` when unnamed
    pub(crate) fn create_column<F>(
        &mut self,
        table: Option<TableId>,
        source: &ColumnSource,
        nullable_default: bool,
        implicit: F,
    ) -> ValueId
    where
        F: FnOnce(&dyn crate::naming::NamingStrategy) -> String,
    {
        let name = self
            .normalizer
            .normalize_column_name(source.name.as_deref(), implicit);
        let mut column = Column::new(name);
        column.nullable = source.nullable.unwrap_or(nullable_default);
        column.unique = source.unique;
        column.length = source.length;
        column.precision = source.precision;
        column.scale = source.scale;
        column.sql_type = source.sql_type.clone();
        column.check = source.check.clone();
        column.default_value = source.default_value.clone();
        column.read_fragment = source.read.clone();
        column.write_fragment = source.write.clone();
        self.graph.add_column(table, column)
    }

    /// Add an attribute to its container; a name already taken there is fatal.
    fn register_attribute(
        &mut self,
        scope: &AttributeScope<'_>,
        attribute: AttributeId,
    ) -> Result<(), MappingError> {
        let binding = self.graph.attribute(attribute);
        let name = binding.name.clone();
        let duplicate = || MappingError::DuplicateMapping {
            kind: DuplicateKind::Attribute,
            name: format!("{}.{}", scope.entity_name, binding.path),
        };
        match scope.container {
            AttributeContainer::Entity(entity) => {
                if self.graph.entity(entity).attributes.contains_key(&name) {
                    return Err(duplicate());
                }
            }
            AttributeContainer::Component(component) => {
                if let AttributeKind::Embedded(embedded) = &self.graph.attribute(component).kind {
                    if embedded.attributes.contains_key(&name) {
                        return Err(duplicate());
                    }
                }
            }
        }

        match scope.container {
            AttributeContainer::Entity(entity) => {
                self.graph.entity_mut(entity).attributes.insert(name, attribute);
            }
            AttributeContainer::Component(component) => {
                if let AttributeKind::Embedded(embedded) = &mut self.graph.attribute_mut(component).kind {
                    embedded.attributes.insert(name, attribute);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{FetchTiming, ForeignKeyDirection, ToOneNature};
    use crate::source::{CascadeKind, MappingDocument, ScopeDefaults};

    fn bind_document(yaml: &str, environment: &Environment) -> Result<BindingGraph, MappingError> {
        let document: MappingDocument = serde_yaml::from_str(yaml).unwrap();
        let normalizer = environment.name_normalizer();
        let mut graph = BindingGraph::new();
        {
            let mut binder = EntityBinder::new(&mut graph, environment, &normalizer);
            for entity in &document.entities {
                let unit = BindingUnit {
                    family: SourceFamily::Document,
                    origin: Origin::inline("test.yaml"),
                    package: document.package.clone(),
                    defaults: document.defaults.clone(),
                    auto_import: document.auto_import,
                    source: entity.clone(),
                };
                binder.bind_unit(&unit)?;
            }
        }
        Ok(graph)
    }

    fn bind(yaml: &str) -> BindingGraph {
        bind_document(yaml, &Environment::default()).unwrap()
    }

    fn bind_err(yaml: &str) -> MappingError {
        bind_document(yaml, &Environment::default()).unwrap_err()
    }

    fn column_name(graph: &BindingGraph, value: ValueId) -> String {
        graph.value(value).as_column().unwrap().name.text.clone()
    }

    const ORDER: &str = r#"
package: com.example
entities:
  - name: Order
    table:
      name: orders
    identifier:
      name: id
      type: long
    attributes:
      - kind: basic
        name: total
        type: big_decimal
      - kind: many_to_one
        name: customer
        target: Customer
      - kind: plural
        name: tags
        element:
          kind: basic
          type: string
    subclasses:
      - name: RushOrder
        attributes:
          - kind: basic
            name: priority
"#;

    #[test]
    fn test_binds_entity_table_and_identifier() {
        let graph = bind(ORDER);
        let order = graph.entity_by_name("com.example.Order").unwrap();
        assert!(order.is_root());
        assert_eq!(order.class_name.as_deref(), Some("com.example.Order"));
        assert_eq!(graph.table(order.primary_table).name.text, "orders");

        let id_attribute = graph.identifier_attribute(order.id).unwrap();
        let pk = &graph.table(order.primary_table).primary_key;
        assert_eq!(pk, &graph.attribute(id_attribute).values);
        assert_eq!(column_name(&graph, pk[0]), "id");
        assert!(!graph.value(pk[0]).as_column().unwrap().nullable);

        assert_eq!(
            order.attributes.keys().collect::<Vec<_>>(),
            vec!["id", "total", "customer", "tags"]
        );
        assert_eq!(graph.import("Order"), Some("com.example.Order"));
    }

    #[test]
    fn test_single_table_subclass_shares_root_table() {
        let graph = bind(ORDER);
        let order = graph.entity_by_name("com.example.Order").unwrap();
        let rush = graph.entity_by_name("com.example.RushOrder").unwrap();
        assert_eq!(rush.super_entity, Some(order.id));
        assert_eq!(rush.root, order.id);
        assert_eq!(rush.primary_table, order.primary_table);
        assert_eq!(order.sub_entities, vec![rush.id]);
        assert_eq!(graph.identifier_attribute(rush.id), graph.identifier_attribute(order.id));
        assert!(graph.find_attribute(rush.id, "total").is_some());
    }

    #[test]
    fn test_joined_subclass_gets_key_columns() {
        let graph = bind(
            r#"
package: com.example
entities:
  - name: Payment
    inheritance: joined
    identifier:
      name: id
      type: long
      columns:
        - name: payment_id
    subclasses:
      - name: CardPayment
"#,
        );
        let payment = graph.entity_by_name("com.example.Payment").unwrap();
        let card = graph.entity_by_name("com.example.CardPayment").unwrap();
        assert_ne!(card.primary_table, payment.primary_table);
        assert_eq!(graph.table(card.primary_table).name.text, "CardPayment");
        assert_eq!(card.key_values.len(), 1);
        assert_eq!(column_name(&graph, card.key_values[0]), "payment_id");
        assert_eq!(graph.table(card.primary_table).primary_key, card.key_values);
    }

    #[test]
    fn test_discriminator_defaults() {
        let graph = bind(
            r#"
entities:
  - name: com.example.Animal
    discriminator: {}
    identifier:
      name: id
    subclasses:
      - name: com.example.Dog
        discriminator_value: D
"#,
        );
        let animal = graph.entity_by_name("com.example.Animal").unwrap();
        let discriminator = animal
            .hierarchy
            .as_ref()
            .unwrap()
            .discriminator
            .as_ref()
            .unwrap();
        assert_eq!(
            discriminator.type_descriptor.explicit_type_name.as_deref(),
            Some("string")
        );
        assert_eq!(column_name(&graph, discriminator.value), "DTYPE");
        assert_eq!(animal.discriminator_value.as_deref(), Some("com.example.Animal"));
        let dog = graph.entity_by_name("com.example.Dog").unwrap();
        assert_eq!(dog.discriminator_value.as_deref(), Some("D"));
    }

    #[test]
    fn test_discriminator_column_and_formula() {
        let err = bind_err(
            r#"
entities:
  - name: Animal
    discriminator:
      formula: "case when x then 1 end"
      column:
        name: kind
"#,
        );
        assert!(matches!(err, MappingError::ColumnAndFormula { .. }));
    }

    #[test]
    fn test_duplicate_entity_names_identity() {
        let err = bind_err(
            r#"
package: com.example
entities:
  - name: Foo
  - name: Foo
"#,
        );
        assert_eq!(err.to_string(), "duplicate entity mapping: com.example.Foo");
    }

    #[test]
    fn test_duplicate_attribute_names_entity_and_path() {
        let err = bind_err(
            r#"
package: com.example
entities:
  - name: Foo
    attributes:
      - kind: basic
        name: code
      - kind: basic
        name: code
"#,
        );
        assert_eq!(err.to_string(), "duplicate attribute mapping: com.example.Foo.code");

        let err = bind_err(
            r#"
package: com.example
entities:
  - name: Foo
    attributes:
      - kind: embedded
        name: address
        attributes:
          - kind: basic
            name: city
          - kind: basic
            name: city
"#,
        );
        assert_eq!(
            err.to_string(),
            "duplicate attribute mapping: com.example.Foo.address.city"
        );
    }

    #[test]
    fn test_schema_from_defaults_stack() {
        let environment = Environment {
            default_schema: Some("main".to_string()),
            ..Environment::default()
        };
        let graph = bind_document(
            r#"
defaults:
  schema: shop
entities:
  - name: com.example.Order
  - name: com.example.Audit
    defaults:
      schema: audit
  - name: com.example.Note
    table:
      schema: notes
"#,
            &environment,
        )
        .unwrap();

        let schema = |name: &str| {
            let entity = graph.entity_by_name(name).unwrap();
            graph
                .table(entity.primary_table)
                .schema
                .as_ref()
                .map(|schema| schema.text.clone())
        };
        assert_eq!(schema("com.example.Order").as_deref(), Some("shop"));
        assert_eq!(schema("com.example.Audit").as_deref(), Some("audit"));
        assert_eq!(schema("com.example.Note").as_deref(), Some("notes"));
    }

    #[test]
    fn test_to_one_defaults_in_documents() {
        let graph = bind(ORDER);
        let order = graph.entity_by_name("com.example.Order").unwrap();
        let customer = graph.attribute(order.attribute("customer").unwrap());
        let to_one = customer.as_to_one().unwrap();
        assert_eq!(to_one.nature, ToOneNature::ManyToOne);
        assert_eq!(to_one.fetch_timing, FetchTiming::Delayed);
        assert_eq!(to_one.foreign_key_direction, ForeignKeyDirection::ToParent);
        assert!(!to_one.unique);
        assert!(to_one.cascade.is_none());
        assert_eq!(column_name(&graph, customer.values[0]), "customer");
        assert!(!to_one.target.is_resolved());
    }

    #[test]
    fn test_document_cascade_default() {
        let environment = Environment::default();
        let graph = bind_document(
            r#"
defaults:
  cascade: all
entities:
  - name: com.example.Line
    attributes:
      - kind: many_to_one
        name: order
        target: com.example.Order
      - kind: many_to_one
        name: product
        target: com.example.Product
        cascade: [persist]
        orphan_removal: true
"#,
            &environment,
        )
        .unwrap();
        let line = graph.entity_by_name("com.example.Line").unwrap();
        let order = graph.attribute(line.attribute("order").unwrap()).as_to_one().unwrap();
        assert!(order.cascade.is_all());
        let product = graph
            .attribute(line.attribute("product").unwrap())
            .as_to_one()
            .unwrap();
        assert!(product.cascade.contains(CascadeKind::Persist));
        assert!(product.cascade.contains(CascadeKind::DeleteOrphan));
        assert!(!product.cascade.contains(CascadeKind::Merge));
    }

    #[test]
    fn test_root_defaults_from_environment() {
        let environment = Environment {
            default_cascade: "persist".to_string(),
            ..Environment::default()
        };
        let document = ScopeDefaults::default();
        let stack = DefaultsStack::new(environment.root_defaults()).nested(&document);
        assert_eq!(stack.cascade(), Some("persist"));
    }
}
