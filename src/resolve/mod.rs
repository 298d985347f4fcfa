//! Resolution passes run over the whole graph once binding is done.

pub mod association;
pub mod identifier;
pub mod types;

pub use association::resolve_associations;
pub use identifier::resolve_identifier_generators;
pub use types::{resolve_types, TypeResolutionReport};
