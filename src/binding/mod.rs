//! The binding graph and its data model.
//!
//! Bindings live in arenas owned by [`BindingGraph`] and refer to one another
//! through the integer ids defined here, so cross references (supertypes,
//! association targets, back references) never own what they point at.

pub mod attribute;
pub mod entity;
pub mod graph;
pub mod registries;
pub mod relational;
pub mod type_descriptor;

use serde::Serialize;
use std::fmt;

pub use attribute::{
    AssociationTarget, AttributeBinding, AttributeContainer, AttributeConversionInfo,
    AttributeKind, CascadeStyle, EmbeddedBinding, FetchTiming, ForeignKeyDirection,
    PluralBinding, PluralElement, ToOneBinding, ToOneNature,
};
pub use entity::{Caching, EntityBinding, EntityDiscriminator, EntityIdentifier, HierarchyDetails};
pub use graph::BindingGraph;
pub use registries::{FilterDefinition, FilterParameter, Registries};
pub use relational::{Column, Datatype, DerivedValue, RelationalValue, Table};
pub use type_descriptor::TypeDescriptor;

macro_rules! arena_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(&self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $prefix, self.0)
            }
        }
    };
}

arena_id!(EntityId, "entity");
arena_id!(AttributeId, "attribute");
arena_id!(ValueId, "value");
arena_id!(TableId, "table");
