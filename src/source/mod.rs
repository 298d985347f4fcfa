//! Mapping sources: the read-only input contract of the binding engine.

pub mod loader;
pub mod types;

pub use loader::{load_declarations, load_document, load_sources};
pub use types::*;
