//! Attribute bindings: common settings plus a tagged kind.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use super::entity::Caching;
use super::type_descriptor::TypeDescriptor;
use super::{AttributeId, EntityId, TableId, ValueId};
use crate::source::{
    CascadeKind, CollectionNature, FetchStyle, NaturalIdMutability, NotFoundAction, Origin,
    PropertyGeneration,
};

/// Kinds implied by `all`
const ALL_KINDS: [CascadeKind; 8] = [
    CascadeKind::SaveUpdate,
    CascadeKind::Persist,
    CascadeKind::Merge,
    CascadeKind::Delete,
    CascadeKind::Lock,
    CascadeKind::Refresh,
    CascadeKind::Evict,
    CascadeKind::Replicate,
];

/// Effective cascade of an association, with `all` and `none` expanded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeStyle {
    kinds: BTreeSet<CascadeKind>,
}

impl CascadeStyle {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_kinds(kinds: &[CascadeKind]) -> Self {
        let mut expanded = BTreeSet::new();
        for kind in kinds {
            match kind {
                CascadeKind::None => {}
                CascadeKind::All => expanded.extend(ALL_KINDS),
                CascadeKind::AllDeleteOrphan => {
                    expanded.extend(ALL_KINDS);
                    expanded.insert(CascadeKind::DeleteOrphan);
                }
                other => {
                    expanded.insert(*other);
                }
            }
        }
        Self { kinds: expanded }
    }

    /// Parse a comma separated list such as `"all"` or `"persist, merge"`.
    pub fn parse(text: &str) -> Result<Self, String> {
        Ok(Self::from_kinds(&CascadeKind::parse_list(text)?))
    }

    pub fn with_delete_orphan(mut self) -> Self {
        self.kinds.insert(CascadeKind::DeleteOrphan);
        self
    }

    pub fn contains(&self, kind: CascadeKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_none(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn is_all(&self) -> bool {
        ALL_KINDS.iter().all(|kind| self.kinds.contains(kind))
    }

    pub fn kinds(&self) -> impl Iterator<Item = CascadeKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl fmt::Display for CascadeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let mut parts = Vec::new();
        if self.is_all() {
            parts.push("all");
            if self.contains(CascadeKind::DeleteOrphan) {
                parts.push(CascadeKind::DeleteOrphan.as_str());
            }
        } else {
            parts.extend(self.kinds.iter().map(|kind| kind.as_str()));
        }
        write!(f, "{}", parts.join(","))
    }
}

impl Serialize for CascadeStyle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTiming {
    Immediate,
    Delayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToOneNature {
    ManyToOne,
    OneToOne,
}

/// Side holding the foreign key of a to-one association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyDirection {
    FromParent,
    ToParent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeConversionInfo {
    pub enabled: bool,
    pub converter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AttributeContainer {
    Entity(EntityId),
    Component(AttributeId),
}

/// Textual reference to another entity, resolved by the association pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssociationTarget {
    pub referenced_entity_name: Option<String>,
    pub referenced_attribute_name: Option<String>,
    pub resolved_entity: Option<EntityId>,
    pub resolved_attribute: Option<AttributeId>,
}

impl AssociationTarget {
    pub fn new(entity_name: Option<String>, attribute_name: Option<String>) -> Self {
        Self {
            referenced_entity_name: entity_name,
            referenced_attribute_name: attribute_name,
            resolved_entity: None,
            resolved_attribute: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_entity.is_some() && self.resolved_attribute.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToOneBinding {
    pub nature: ToOneNature,
    pub target: AssociationTarget,
    pub cascade: CascadeStyle,
    pub fetch_timing: FetchTiming,
    pub fetch_style: FetchStyle,
    pub unique: bool,
    pub foreign_key_direction: ForeignKeyDirection,
    pub optional: bool,
    pub orphan_removal: bool,
    pub not_found: NotFoundAction,
    pub foreign_key_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluralElement {
    Basic {
        type_descriptor: TypeDescriptor,
        values: Vec<ValueId>,
        conversion: Option<AttributeConversionInfo>,
    },
    OneToMany {
        target: AssociationTarget,
    },
    ManyToMany {
        target: AssociationTarget,
        values: Vec<ValueId>,
    },
}

impl PluralElement {
    pub fn nature_name(&self) -> &'static str {
        match self {
            PluralElement::Basic { .. } => "basic",
            PluralElement::OneToMany { .. } => "one-to-many",
            PluralElement::ManyToMany { .. } => "many-to-many",
        }
    }

    pub fn association_target(&self) -> Option<&AssociationTarget> {
        match self {
            PluralElement::Basic { .. } => None,
            PluralElement::OneToMany { target } | PluralElement::ManyToMany { target, .. } => {
                Some(target)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PluralBinding {
    /// `<entity name>.<attribute path>`
    pub role: String,
    pub nature: CollectionNature,
    pub element: PluralElement,
    pub collection_table: Option<TableId>,
    pub key_values: Vec<ValueId>,
    pub index_value: Option<ValueId>,
    pub inverse: bool,
    pub cascade: CascadeStyle,
    pub fetch_timing: FetchTiming,
    pub fetch_style: FetchStyle,
    pub orphan_removal: bool,
    pub order_by: Option<String>,
    pub caching: Option<Caching>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedBinding {
    pub class: Option<String>,
    pub attributes: IndexMap<String, AttributeId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    Basic,
    ToOne(ToOneBinding),
    Plural(PluralBinding),
    Embedded(EmbeddedBinding),
}

/// One bound attribute
#[derive(Debug, Clone, Serialize)]
pub struct AttributeBinding {
    pub id: AttributeId,
    pub name: String,
    /// Dotted path from the owning entity
    pub path: String,
    pub container: AttributeContainer,
    pub entity: EntityId,
    pub type_descriptor: TypeDescriptor,
    pub values: Vec<ValueId>,
    pub domain_type: Option<String>,
    pub access: String,
    pub natural_id: NaturalIdMutability,
    pub optimistic_lock: bool,
    pub generation: PropertyGeneration,
    pub lazy: bool,
    pub insertable: bool,
    pub updatable: bool,
    pub conversion: Option<AttributeConversionInfo>,
    /// Associations elsewhere that reference this attribute
    pub inbound: Vec<AttributeId>,
    pub origin: Origin,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl AttributeBinding {
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            AttributeKind::Basic => "basic",
            AttributeKind::ToOne(to_one) => match to_one.nature {
                ToOneNature::ManyToOne => "many-to-one",
                ToOneNature::OneToOne => "one-to-one",
            },
            AttributeKind::Plural(_) => "plural",
            AttributeKind::Embedded(_) => "embedded",
        }
    }

    pub fn is_association(&self) -> bool {
        self.association_target().is_some()
    }

    /// Target of a to-one attribute or an association-typed collection element
    pub fn association_target(&self) -> Option<&AssociationTarget> {
        match &self.kind {
            AttributeKind::ToOne(to_one) => Some(&to_one.target),
            AttributeKind::Plural(plural) => plural.element.association_target(),
            AttributeKind::Basic | AttributeKind::Embedded(_) => None,
        }
    }

    pub(crate) fn association_target_mut(&mut self) -> Option<&mut AssociationTarget> {
        match &mut self.kind {
            AttributeKind::ToOne(to_one) => Some(&mut to_one.target),
            AttributeKind::Plural(plural) => match &mut plural.element {
                PluralElement::Basic { .. } => None,
                PluralElement::OneToMany { target } | PluralElement::ManyToMany { target, .. } => {
                    Some(target)
                }
            },
            AttributeKind::Basic | AttributeKind::Embedded(_) => None,
        }
    }

    /// Fetch timing of associations and collections
    pub fn fetch_timing(&self) -> Option<FetchTiming> {
        match &self.kind {
            AttributeKind::ToOne(to_one) => Some(to_one.fetch_timing),
            AttributeKind::Plural(plural) => Some(plural.fetch_timing),
            AttributeKind::Basic | AttributeKind::Embedded(_) => None,
        }
    }

    pub fn as_to_one(&self) -> Option<&ToOneBinding> {
        match &self.kind {
            AttributeKind::ToOne(to_one) => Some(to_one),
            _ => None,
        }
    }

    pub fn as_plural(&self) -> Option<&PluralBinding> {
        match &self.kind {
            AttributeKind::Plural(plural) => Some(plural),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&EmbeddedBinding> {
        match &self.kind {
            AttributeKind::Embedded(embedded) => Some(embedded),
            _ => None,
        }
    }

    pub fn is_natural_id(&self) -> bool {
        self.natural_id != NaturalIdMutability::NotNaturalId
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_expands_and_displays() {
        let style = CascadeStyle::from_kinds(&[CascadeKind::All]);
        assert!(style.contains(CascadeKind::Merge));
        assert!(style.is_all());
        assert_eq!(style.to_string(), "all");
        assert_eq!(style.with_delete_orphan().to_string(), "all,delete-orphan");
    }

    #[test]
    fn test_none_and_partial_styles() {
        assert!(CascadeStyle::parse("none").unwrap().is_none());
        assert_eq!(CascadeStyle::none().to_string(), "none");

        let style = CascadeStyle::parse("persist, merge").unwrap();
        assert!(!style.is_all());
        assert_eq!(style.to_string(), "persist,merge");
    }

    #[test]
    fn test_all_delete_orphan() {
        let style = CascadeStyle::parse("all-delete-orphan").unwrap();
        assert!(style.contains(CascadeKind::DeleteOrphan));
        assert!(style.contains(CascadeKind::SaveUpdate));
    }
}
