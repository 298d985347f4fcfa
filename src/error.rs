//! Error types for metadata binding and cross-reference resolution.
//!
//! Every fatal condition raised while building metadata is a [`MappingError`].
//! The orchestrator wraps the first fatal error together with the build phase
//! it occurred in as a [`BuildError`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::id::GeneratorError;
use crate::metadata::BuildPhase;
use crate::source::Origin;

/// Kind of identity named by a duplicate-mapping error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Entity,
    Attribute,
    Collection,
    Import,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateKind::Entity => write!(f, "entity"),
            DuplicateKind::Attribute => write!(f, "attribute"),
            DuplicateKind::Collection => write!(f, "collection"),
            DuplicateKind::Import => write!(f, "import"),
        }
    }
}

/// Fatal error raised while binding or resolving mapping metadata
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("duplicate {kind} mapping: {name}")]
    DuplicateMapping { kind: DuplicateKind, name: String },

    #[error("association {entity}.{attribute} does not name a referenced entity")]
    MissingReferencedEntityName { entity: String, attribute: String },

    #[error("association {entity}.{attribute} refers to unknown entity: {target}")]
    UnknownEntity {
        entity: String,
        attribute: String,
        target: String,
    },

    #[error("association {entity}.{attribute} refers to unknown attribute: {target}.{referenced}")]
    UnknownAttribute {
        entity: String,
        attribute: String,
        target: String,
        referenced: String,
    },

    #[error("following supertypes referenced in extends not found: {}", .entries.join(","))]
    UnresolvedSupertypes { entries: Vec<String> },

    #[error("circular inheritance between declared entities: {}", .entities.join(", "))]
    CircularInheritance { entities: Vec<String> },

    #[error("{kind} attribute {entity}.{attribute} cannot use attribute conversion")]
    InvalidConversion {
        entity: String,
        attribute: String,
        kind: &'static str,
    },

    #[error("attribute override for {entity}.{attribute} is ambiguous: the attribute maps {columns} columns")]
    AmbiguousOverride {
        entity: String,
        attribute: String,
        columns: usize,
    },

    #[error("attribute {entity}.{attribute} declares both columns and a formula")]
    ColumnAndFormula { entity: String, attribute: String },

    #[error("could not resolve identifier type of entity {entity} (tried: {tried})")]
    UnresolvedIdentifierType { entity: String, tried: String },

    #[error("could not resolve discriminator type of entity {entity} (type name: {type_name})")]
    UnresolvedDiscriminatorType { entity: String, type_name: String },

    #[error("identifier type of entity {entity} was not resolved before generator creation")]
    MissingIdentifierType { entity: String },

    #[error("identifier generator of entity {entity}: {source}")]
    IdentifierGenerator {
        entity: String,
        #[source]
        source: GeneratorError,
    },

    #[error("fetch profile {profile} refers to unknown entity: {entity}")]
    UnknownFetchProfileEntity { profile: String, entity: String },

    #[error("supertype {supertype} of entity {entity} is not bound")]
    UnboundSupertype { entity: String, supertype: String },

    #[error("invalid source: {reason}")]
    InvalidSource { reason: String },

    #[error("invalid mapping in {origin}: {source}")]
    InvalidMapping {
        origin: Origin,
        #[source]
        source: Box<MappingError>,
    },

    #[error("phase {phase} entered before {required} completed")]
    PhaseOrder {
        phase: BuildPhase,
        required: BuildPhase,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MappingError {
    /// The error underneath any source-origin context.
    pub fn innermost(&self) -> &MappingError {
        match self {
            MappingError::InvalidMapping { source, .. } => source.innermost(),
            other => other,
        }
    }

    /// Attach the origin of the source being bound.
    pub fn in_origin(self, origin: &Origin) -> MappingError {
        match self {
            already @ MappingError::InvalidMapping { .. } => already,
            other => MappingError::InvalidMapping {
                origin: origin.clone(),
                source: Box::new(other),
            },
        }
    }
}

/// A metadata build aborted in `phase`
#[derive(Debug, Error)]
#[error("metadata build failed during {phase}: {error}")]
pub struct BuildError {
    pub phase: BuildPhase,
    #[source]
    pub error: MappingError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_unwraps_origin_context() {
        let err = MappingError::InvalidConversion {
            entity: "com.example.Order".to_string(),
            attribute: "customer".to_string(),
            kind: "many-to-one",
        }
        .in_origin(&Origin::inline("orders"));

        assert!(err.to_string().contains("inline orders"));
        assert!(matches!(err.innermost(), MappingError::InvalidConversion { .. }));
    }

    #[test]
    fn test_origin_is_attached_once() {
        let err = MappingError::InvalidSource {
            reason: "empty".to_string(),
        }
        .in_origin(&Origin::inline("first"))
        .in_origin(&Origin::inline("second"));

        match err {
            MappingError::InvalidMapping { origin, .. } => assert_eq!(origin.name, "first"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unresolved_supertypes_lists_every_entry() {
        let err = MappingError::UnresolvedSupertypes {
            entries: vec!["a.Missing".to_string(), "Other[b]".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "following supertypes referenced in extends not found: a.Missing,Other[b]"
        );
    }
}
