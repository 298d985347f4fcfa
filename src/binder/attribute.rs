use indexmap::IndexMap;

use super::{AttributeScope, EntityBinder};
use crate::binding::{
    AttributeBinding, AttributeConversionInfo, AttributeId, AttributeKind, DerivedValue,
    EmbeddedBinding, RelationalValue, ToOneNature, TypeDescriptor, ValueId,
};
use crate::error::MappingError;
use crate::source::{
    AttributeCommon, AttributeSource, BasicAttributeSource, ColumnSource, ConversionSource,
    EmbeddedAttributeSource,
};

pub(crate) fn conversion_info(conversion: Option<&ConversionSource>) -> Option<AttributeConversionInfo> {
    conversion.map(|conversion| AttributeConversionInfo {
        enabled: conversion.enabled,
        converter: conversion.converter.clone(),
    })
}

impl EntityBinder<'_> {
    /// Bind one attribute and register it with its container
    pub(crate) fn bind_attribute(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &AttributeSource,
    ) -> Result<AttributeId, MappingError> {
        let id = match source {
            AttributeSource::Basic(basic) => self.bind_basic(scope, basic, false)?,
            AttributeSource::ManyToOne(to_one) => {
                self.bind_to_one(scope, to_one, ToOneNature::ManyToOne)?
            }
            AttributeSource::OneToOne(to_one) => {
                self.bind_to_one(scope, to_one, ToOneNature::OneToOne)?
            }
            AttributeSource::Plural(plural) => self.bind_plural(scope, plural)?,
            AttributeSource::Embedded(embedded) => self.bind_embedded(scope, embedded)?,
        };
        self.register_attribute(scope, id)?;
        Ok(id)
    }

    /// Common settings of a new attribute; the id is the next free one
    pub(crate) fn new_attribute(
        &self,
        scope: &AttributeScope<'_>,
        common: &AttributeCommon,
        kind: AttributeKind,
        values: Vec<ValueId>,
        lazy: bool,
    ) -> AttributeBinding {
        let access = common
            .access
            .clone()
            .or_else(|| scope.defaults.access().map(str::to_string))
            .unwrap_or_else(|| "property".to_string());

        AttributeBinding {
            id: self.graph.next_attribute_id(),
            name: common.name.clone(),
            path: scope.path(&common.name),
            container: scope.container,
            entity: scope.entity,
            type_descriptor: TypeDescriptor::new(
                common.type_name.clone(),
                common.type_parameters.clone(),
                common.value_type.clone(),
            ),
            values,
            domain_type: None,
            access,
            natural_id: common.natural_id,
            optimistic_lock: common.optimistic_lock,
            generation: common.generation,
            lazy,
            insertable: common.insertable,
            updatable: common.updatable,
            conversion: None,
            inbound: Vec::new(),
            origin: scope.origin.clone(),
            kind,
        }
    }

    /// Basic attribute; identifiers get non-nullable columns.
    pub(crate) fn bind_basic(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &BasicAttributeSource,
        identifier: bool,
    ) -> Result<AttributeId, MappingError> {
        let name = &source.common.name;
        let path = scope.path(name);
        let nullable = !identifier && source.nullable.unwrap_or(true);

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
            None => self.bind_columns(scope, &path, name, &source.columns, nullable, || {
                source.implicit_column()
            })?,
        };

        let mut binding = self.new_attribute(
            scope,
            &source.common,
            AttributeKind::Basic,
            values,
            source.common.lazy.unwrap_or(false),
        );
        binding.conversion = conversion_info(source.common.conversion.as_ref());
        Ok(self.graph.add_attribute(binding))
    }

    /// Columns of a singular attribute, with attribute overrides applied.
    ///
    /// Without declared columns a single column is implied, named by the
    /// naming strategy unless an override names it. An override cannot apply
    /// to an attribute mapping several columns.
    pub(crate) fn bind_columns<F>(
        &mut self,
        scope: &AttributeScope<'_>,
        path: &str,
        name: &str,
        columns: &[ColumnSource],
        nullable: bool,
        implicit: F,
    ) -> Result<Vec<ValueId>, MappingError>
    where
        F: FnOnce() -> ColumnSource,
    {
        let override_column = scope.override_for(path, name);
        let table = Some(scope.table);

        match columns {
            [] => {
                let column = match override_column {
                    Some(over) => implicit().overlay(over),
                    None => implicit(),
                };
                Ok(vec![self.create_column(table, &column, nullable, |naming| {
                    naming.property_to_column_name(path)
                })])
            }
            [single] => {
                let column = match override_column {
                    Some(over) => single.overlay(over),
                    None => single.clone(),
                };
                Ok(vec![self.create_column(table, &column, nullable, |naming| {
                    naming.property_to_column_name(path)
                })])
            }
            several => {
                if override_column.is_some() {
                    return Err(MappingError::AmbiguousOverride {
                        entity: scope.entity_name.to_string(),
                        attribute: path.to_string(),
                        columns: several.len(),
                    });
                }
                Ok(several
                    .iter()
                    .enumerate()
                    .map(|(index, column)| {
                        self.create_column(table, column, nullable, |naming| {
                            format!("{}_{}", naming.property_to_column_name(path), index)
                        })
                    })
                    .collect())
            }
        }
    }

    fn bind_embedded(
        &mut self,
        scope: &AttributeScope<'_>,
        source: &EmbeddedAttributeSource,
    ) -> Result<AttributeId, MappingError> {
        let path = scope.path(&source.common.name);
        if source.common.conversion.is_some() {
            return Err(MappingError::InvalidConversion {
                entity: scope.entity_name.to_string(),
                attribute: path,
                kind: "embedded",
            });
        }

        let kind = AttributeKind::Embedded(EmbeddedBinding {
            class: source.class.clone(),
            attributes: IndexMap::new(),
        });
        let mut binding = self.new_attribute(scope, &source.common, kind, Vec::new(), false);
        binding.domain_type = source.class.clone();
        let id = self.graph.add_attribute(binding);

        let nested = AttributeScope {
            container: crate::binding::AttributeContainer::Component(id),
            path_prefix: Some(path),
            local_overrides: Some(&source.attribute_overrides),
            ..scope.clone()
        };
        let mut values = Vec::new();
        for attribute in &source.attributes {
            let child = self.bind_attribute(&nested, attribute)?;
            values.extend(self.graph.attribute(child).values.iter().copied());
        }
        self.graph.attribute_mut(id).values = values;

        Ok(id)
    }
}
