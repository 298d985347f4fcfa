use super::attribute::conversion_info;
use super::{AttributeScope, EntityBinder};
use crate::binding::{
    AssociationTarget, AttributeKind, CascadeStyle, DerivedValue, EntityId, FetchTiming,
    ForeignKeyDirection, PluralBinding, PluralElement, RelationalValue, TableId, ToOneBinding,
    ToOneNature, TypeDescriptor, ValueId,
};
use crate::binder::DefaultsStack;
use crate::error::MappingError;
use crate::source::{
    unqualify, CascadeKind, CollectionNature, ColumnSource, FetchStyle, PluralAttributeSource,
    PluralElementSource, SourceFamily, ToOneAttributeSource,
};

/// Implicit element column of a collection of basic values
const ELEMENT_COLUMN: &str = "elt";

fn nature_label(nature: ToOneNature) -> &'static str {
    match nature {
        ToOneNature::ManyToOne => "many-to-one",
        ToOneNature::OneToOne => "one-to-one",
    }
}

fn fetch_timing(lazy: bool) -> FetchTiming {
    if lazy {
        FetchTiming::Delayed
    } else {
        FetchTiming::Immediate
    }
}

/// Declared cascade, else the nearest scope default; orphan removal adds
/// `delete-orphan`.
pub(crate) fn cascade_style(
    declared: Option<&[CascadeKind]>,
    defaults: &DefaultsStack,
    orphan_removal: bool,
) -> Result<CascadeStyle, MappingError> {
    let style = match declared {
        Some(kinds) => CascadeStyle::from_kinds(kinds),
        None => CascadeStyle::parse(defaults.cascade().unwrap_or("none"))
            .map_err(|reason| MappingError::InvalidSource { reason })?,
    };
    Ok(if orphan_removal {
        style.with_delete_orphan()
    } else {
        style
    })
}

impl EntityBinder<'_> {
    /// Many-to-one or one-to-one association.
    ///
    /// Mapping documents default to lazy to-one associations, declarations
    /// to eager ones.
    pub(crate) fn bind_to_one(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &ToOneAttributeSource,
        nature: ToOneNature,
    ) -> Result<crate::binding::AttributeId, MappingError> {
        let name = &source.common.name;
        let path = scope.path(name);
        if source.common.conversion.is_some() {
            return Err(MappingError::InvalidConversion {
                entity: scope.entity_name.to_string(),
                attribute: path,
                kind: nature_label(nature),
            });
        }

        let one_to_one = nature == ToOneNature::OneToOne;
        let lazy = source
            .common
            .lazy
            .unwrap_or(scope.family == SourceFamily::Document);
        let cascade = cascade_style(source.cascade.as_deref(), scope.defaults, source.orphan_removal)?;

        let values = match &source.formula {
            Some(_) if !source.columns.is_empty() => {
                return Err(MappingError::ColumnAndFormula {
                    entity: scope.entity_name.to_string(),
                    attribute: path,
                })
            }
            Some(formula) => vec![self.graph.add_value(RelationalValue::Derived(DerivedValue {
                table: Some(scope.table),
                expression: formula.clone(),
                datatype: None,
            }))],
            // a one-to-one without columns joins on the primary key
            None if one_to_one && source.columns.is_empty() => Vec::new(),
            None => self.bind_columns(
                scope,
                &path,
                name,
                &source.columns,
                source.optional,
                || ColumnSource {
                    unique: one_to_one,
                    ..ColumnSource::default()
                },
            )?,
        };

        let to_one = ToOneBinding {
            nature,
            target: AssociationTarget::new(source.target.clone(), source.property_ref.clone()),
            cascade,
            fetch_timing: fetch_timing(lazy),
            fetch_style: source.fetch.unwrap_or(if lazy {
                FetchStyle::Select
            } else {
                FetchStyle::Join
            }),
            unique: one_to_one,
            foreign_key_direction: if one_to_one && !source.optional {
                ForeignKeyDirection::FromParent
            } else {
                ForeignKeyDirection::ToParent
            },
            optional: source.optional,
            orphan_removal: source.orphan_removal,
            not_found: source.not_found,
            foreign_key_name: source.foreign_key.clone(),
        };

        let binding = self.new_attribute(
            scope,
            &source.common,
            AttributeKind::ToOne(to_one),
            values,
            lazy,
        );
        Ok(self.graph.add_attribute(binding))
    }

    pub(crate) fn bind_plural(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &PluralAttributeSource,
    ) -> Result<crate::binding::AttributeId, MappingError> {
        let path = scope.path(&source.common.name);
        let role = format!("{}.{}", scope.entity_name, path);

        let element_kind = match &source.element {
            PluralElementSource::Basic { .. } => None,
            PluralElementSource::OneToMany { .. } => Some("one-to-many"),
            PluralElementSource::ManyToMany { .. } => Some("many-to-many"),
        };
        if let (Some(kind), Some(_)) = (element_kind, &source.common.conversion) {
            return Err(MappingError::InvalidConversion {
                entity: scope.entity_name.to_string(),
                attribute: path,
                kind,
            });
        }

        let lazy = source.common.lazy.unwrap_or(true);
        let cascade = cascade_style(source.cascade.as_deref(), scope.defaults, source.orphan_removal)?;

        let collection_table = match &source.element {
            PluralElementSource::OneToMany { .. } => None,
            _ => Some(self.bind_collection_table(scope, source, &path)),
        };

        let key_column_name = {
            let owner_column = self.owner_key_column_name(scope.entity);
            self.normalizer
                .naming_strategy()
                .join_key_column_name(scope.entity_name, &owner_column)
        };
        let key_values = self.bind_collection_columns(
            collection_table,
            &source.key_columns,
            collection_table.is_none(),
            |_| key_column_name,
        );

        let index_value = match (&source.index_column, source.nature) {
            (Some(column), _) => Some(self.create_column(collection_table, column, false, |naming| {
                format!("{}_order", naming.property_to_column_name(&path))
            })),
            (None, CollectionNature::List | CollectionNature::Array) => Some(self.create_column(
                collection_table,
                &ColumnSource::default(),
                false,
                |naming| format!("{}_order", naming.property_to_column_name(&path)),
            )),
            (None, CollectionNature::Map) => Some(self.create_column(
                collection_table,
                &ColumnSource::default(),
                false,
                |naming| format!("{}_key", naming.property_to_column_name(&path)),
            )),
            (None, _) => None,
        };

        let element = match &source.element {
            PluralElementSource::Basic {
                type_name,
                type_parameters,
                value_type,
                columns,
                formula,
            } => {
                let values = match formula {
                    Some(_) if !columns.is_empty() => {
                        return Err(MappingError::ColumnAndFormula {
                            entity: scope.entity_name.to_string(),
                            attribute: path,
                        })
                    }
                    Some(formula) => vec![self.graph.add_value(RelationalValue::Derived(DerivedValue {
                        table: collection_table,
                        expression: formula.clone(),
                        datatype: None,
                    }))],
                    None => self.bind_collection_columns(collection_table, columns, true, |_| {
                        ELEMENT_COLUMN.to_string()
                    }),
                };
                PluralElement::Basic {
                    type_descriptor: TypeDescriptor::new(
                        type_name.clone(),
                        type_parameters.clone(),
                        value_type.clone(),
                    ),
                    values,
                    conversion: conversion_info(source.common.conversion.as_ref()),
                }
            }
            PluralElementSource::OneToMany { target } => PluralElement::OneToMany {
                target: AssociationTarget::new(target.clone(), None),
            },
            PluralElementSource::ManyToMany {
                target,
                property_ref,
                columns,
            } => {
                let referenced = target.as_deref().map(unqualify).unwrap_or("element");
                let values = self.bind_collection_columns(collection_table, columns, false, |naming| {
                    naming.foreign_key_column_name(referenced, "id")
                });
                PluralElement::ManyToMany {
                    target: AssociationTarget::new(target.clone(), property_ref.clone()),
                    values,
                }
            }
        };

        let plural = PluralBinding {
            role: role.clone(),
            nature: source.nature,
            element,
            collection_table,
            key_values,
            index_value,
            inverse: source.inverse,
            cascade,
            fetch_timing: fetch_timing(lazy),
            fetch_style: source.fetch.unwrap_or(FetchStyle::Select),
            orphan_removal: source.orphan_removal,
            order_by: source.order_by.clone(),
            caching: self.bind_caching(source.cache.as_ref(), &role),
        };

        let binding = self.new_attribute(
            scope,
            &source.common,
            AttributeKind::Plural(plural),
            Vec::new(),
            lazy,
        );
        let id = self.graph.add_attribute(binding);
        self.graph.register_collection(&role, id)?;
        tracing::debug!("Bound collection {}", role);
        Ok(id)
    }

    fn bind_collection_table(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &PluralAttributeSource,
        path: &str,
    ) -> TableId {
        let table = source.table.clone().unwrap_or_default();
        let owner_table = self.graph.table(scope.table).name.text.clone();
        let schema = table.schema.as_deref().or(scope.defaults.schema());
        let catalog = table.catalog.as_deref().or(scope.defaults.catalog());
        let name = self
            .normalizer
            .normalize_table_name(table.name.as_deref(), |naming| {
                naming.collection_table_name(&owner_table, path)
            });
        let schema = self.normalizer.normalize_database_identifier(schema);
        let catalog = self.normalizer.normalize_database_identifier(catalog);
        self.graph.locate_or_create_table(schema, catalog, name)
    }

    /// Columns in a collection table, or unattached one-to-many key columns.
    ///
    /// Nothing declared implies one column named by `implicit`.
    fn bind_collection_columns<F>(
        &mut self,
        table: Option<TableId>,
        columns: &[ColumnSource],
        nullable: bool,
        implicit: F,
    ) -> Vec<ValueId>
    where
        F: FnOnce(&dyn crate::naming::NamingStrategy) -> String,
    {
        match columns {
            [] => vec![self.create_column(table, &ColumnSource::default(), nullable, implicit)],
            declared => {
                let mut implicit = Some(implicit);
                declared
                    .iter()
                    .map(|column| {
                        let fallback = implicit.take();
                        self.create_column(table, column, nullable, |naming| match fallback {
                            Some(implicit) => implicit(naming),
                            None => naming.column_name("elt"),
                        })
                    })
                    .collect()
            }
        }
    }

    /// First identifier column of the owning hierarchy
    fn owner_key_column_name(&self, entity: EntityId) -> String {
        self.graph
            .identifier_attribute(entity)
            .and_then(|attribute| self.graph.attribute(attribute).values.first().copied())
            .and_then(|value| self.graph.value(value).as_column())
            .map(|column| column.name.text.clone())
            .unwrap_or_else(|| "id".to_string())
    }
}
