//! # Bindery: Metadata Binding and Cross-Reference Resolution
//!
//! Bindery turns declarative persistence mappings into a fully cross-linked
//! metadata graph of entities, attributes, tables and columns.
//!
//! ## Features
//!
//! - **Two source families**: multi-entity YAML mapping documents and single-entity JSON declarations
//! - **Order-independent binding**: subclasses mapped before their supertype wait in an extends queue
//! - **Scoped defaults**: schema, catalog, access and cascade inherited from the nearest declaring scope
//! - **Association resolution**: to-one targets and collection elements linked with back references
//! - **Heuristic type resolution**: type definitions, basic types and parameterized forms like `varchar(255)`
//! - **Pluggable identifier generators**: strategies registered by name on an explicit factory
//!
//! ## Example: Mapping Document
//!
//! ```yaml
//! package: com.example
//! defaults:
//!   schema: shop
//!   cascade: persist
//! entities:
//!   - name: Order
//!     table:
//!       name: orders
//!     identifier:
//!       name: id
//!       type: long
//!       generator:
//!         strategy: sequence
//!     attributes:
//!       - kind: many_to_one
//!         name: customer
//!         target: Customer
//! ```
//!
//! ## Example: Building Metadata
//!
//! ```ignore
//! use bindery::{Environment, MetadataBuilder, MetadataSources};
//!
//! let sources = MetadataSources::from_directory("config/examples/shop")?;
//! let metadata = MetadataBuilder::new(sources, Environment::default()).build()?;
//! let order = metadata.entity_binding("com.example.Order").unwrap();
//! ```

// Configuration and errors
pub mod config;
pub mod error;
pub mod naming;

// Sources and the binding graph
pub mod binding;
pub mod source;
pub mod types;

// Binding and resolution
pub mod binder;
pub mod id;
pub mod queue;
pub mod resolve;

// Build orchestration
pub mod metadata;

// Re-export key types
pub use config::{ConfigError, Environment, ProcessingOrder};
pub use error::{BuildError, MappingError};
pub use naming::{DefaultNamingStrategy, ImprovedNamingStrategy, NamingStrategy, ObjectNameNormalizer};

pub use binding::{
    AttributeBinding, AttributeId, AttributeKind, BindingGraph, CascadeStyle, EntityBinding,
    EntityId, FetchTiming, ForeignKeyDirection,
};
pub use source::{load_sources, DeclaredEntity, EntitySource, MappingDocument, Origin, SourceFamily};
pub use types::{BasicType, ResolvedType, TypeError, TypeRegistry};

pub use id::{DefaultIdentifierGeneratorFactory, IdentifierGenerator, IdentifierGeneratorFactory};
pub use metadata::{BuildPhase, Metadata, MetadataBuilder, MetadataSources};
