//! Identifier generators and the pluggable factory that creates them.
//!
//! Strategies are registered by name with a constructor function, the same
//! way transforms are looked up by name at runtime. The factory is handed to
//! the metadata builder explicitly; nothing here is global.

pub mod generators;

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::naming::ObjectNameNormalizer;
use crate::types::ResolvedType;

pub use generators::{
    AssignedGenerator, ForeignGenerator, IdentityGenerator, IncrementGenerator,
    SequenceStyleGenerator, TableGenerator, UuidGenerator,
};

pub const ENTITY_NAME: &str = "entity_name";
pub const TARGET_TABLE: &str = "target_table";
pub const TARGET_COLUMN: &str = "target_column";
pub const SCHEMA: &str = "schema";
pub const CATALOG: &str = "catalog";
pub const PREFER_POOLED_LO: &str = "optimizer.pooled.prefer_lo";
pub const OPTIMIZER: &str = "optimizer";
pub const INCREMENT_SIZE: &str = "increment_size";
pub const INITIAL_VALUE: &str = "initial_value";
pub const SEQUENCE_NAME: &str = "sequence_name";
pub const TABLE_NAME: &str = "table_name";
pub const SEGMENT_VALUE: &str = "segment_value";
pub const PROPERTY: &str = "property";

/// Failure creating an identifier generator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("unknown generator strategy: {strategy}")]
    UnknownStrategy { strategy: String },

    #[error("unknown identifier generator definition: {name}")]
    UnknownDefinition { name: String },

    #[error("strategy {strategy} cannot generate values of type {type_name}")]
    IncompatibleType { strategy: String, type_name: String },

    #[error("strategy {strategy} requires parameter {parameter}")]
    MissingParameter { strategy: String, parameter: String },

    #[error("invalid generator parameter {parameter}={value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("foreign generator property {property} is not a to-one attribute")]
    ForeignPropertyNotFound { property: String },
}

/// How a sequence or table generator hands out blocks of values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    None,
    Pooled,
    PooledLo,
}

/// A configured identifier generator
pub trait IdentifierGenerator: fmt::Debug + Send + Sync {
    fn strategy(&self) -> &str;

    /// Qualified names of the sequences or tables the generator relies on
    fn database_objects(&self) -> Vec<String> {
        Vec::new()
    }

    fn optimizer(&self) -> OptimizerKind {
        OptimizerKind::None
    }

    fn increment_size(&self) -> i64 {
        1
    }

    /// Whether the value is only known after the row is inserted
    fn is_post_insert(&self) -> bool {
        false
    }
}

/// Everything a generator constructor may consult
#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig<'a> {
    pub entity_name: &'a str,
    pub identifier_type: &'a ResolvedType,
    pub parameters: &'a IndexMap<String, String>,
    pub normalizer: &'a ObjectNameNormalizer,
}

impl<'a> GeneratorConfig<'a> {
    pub fn parameter(&self, key: &str) -> Option<&'a str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn int_parameter(&self, key: &str, default: i64) -> Result<i64, GeneratorError> {
        match self.parameter(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| GeneratorError::InvalidParameter {
                    parameter: key.to_string(),
                    value: value.to_string(),
                }),
            None => Ok(default),
        }
    }

    pub fn bool_parameter(&self, key: &str, default: bool) -> Result<bool, GeneratorError> {
        match self.parameter(key).map(|value| value.trim().to_lowercase()) {
            Some(value) if value == "true" => Ok(true),
            Some(value) if value == "false" => Ok(false),
            Some(value) => Err(GeneratorError::InvalidParameter {
                parameter: key.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }
}

/// Creates identifier generators by strategy name
pub trait IdentifierGeneratorFactory: Send + Sync {
    fn create_identifier_generator(
        &self,
        strategy: &str,
        config: &GeneratorConfig<'_>,
    ) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError>;
}

/// Constructor registered for one strategy name
pub trait GeneratorConstructor: Send + Sync {
    fn construct(
        &self,
        config: &GeneratorConfig<'_>,
    ) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError>;
}

impl<F> GeneratorConstructor for F
where
    F: Fn(&GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError>
        + Send
        + Sync,
{
    fn construct(
        &self,
        config: &GeneratorConfig<'_>,
    ) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
        self(config)
    }
}

/// Registry of generator constructors keyed by strategy name
pub struct DefaultIdentifierGeneratorFactory {
    constructors: HashMap<String, Box<dyn GeneratorConstructor>>,
}

impl DefaultIdentifierGeneratorFactory {
    /// Create a factory without any strategies
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Create a factory with the built-in strategies
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register("assigned", Box::new(generators::assigned));
        factory.register("increment", Box::new(generators::increment));
        factory.register("identity", Box::new(generators::identity));
        for name in ["sequence", "native", "enhanced-sequence"] {
            factory.register(name, Box::new(generators::sequence));
        }
        for name in ["table", "enhanced-table"] {
            factory.register(name, Box::new(generators::table));
        }
        for name in ["uuid", "uuid2"] {
            factory.register(name, Box::new(generators::uuid));
        }
        factory.register("foreign", Box::new(generators::foreign));
        factory
    }

    /// Register a constructor; a later registration for the same name wins.
    pub fn register(&mut self, strategy: impl Into<String>, constructor: Box<dyn GeneratorConstructor>) {
        self.constructors.insert(strategy.into(), constructor);
    }

    pub fn has_strategy(&self, strategy: &str) -> bool {
        self.constructors.contains_key(strategy)
    }

    /// Registered strategy names, sorted
    pub fn strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for DefaultIdentifierGeneratorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultIdentifierGeneratorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultIdentifierGeneratorFactory")
            .field("strategies", &self.strategies())
            .finish()
    }
}

impl IdentifierGeneratorFactory for DefaultIdentifierGeneratorFactory {
    fn create_identifier_generator(
        &self,
        strategy: &str,
        config: &GeneratorConfig<'_>,
    ) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
        let constructor =
            self.constructors
                .get(strategy)
                .ok_or_else(|| GeneratorError::UnknownStrategy {
                    strategy: strategy.to_string(),
                })?;
        constructor.construct(config)
    }
}

/// Generator attached to a hierarchy root
#[derive(Debug, Clone, Serialize)]
pub struct IdentifierGeneratorBinding {
    pub strategy: String,
    pub parameters: IndexMap<String, String>,
    pub optimizer: OptimizerKind,
    pub database_objects: Vec<String>,
    #[serde(skip)]
    pub generator: Arc<dyn IdentifierGenerator>,
}

impl IdentifierGeneratorBinding {
    pub fn new(
        strategy: &str,
        parameters: IndexMap<String, String>,
        generator: Arc<dyn IdentifierGenerator>,
    ) -> Self {
        Self {
            strategy: strategy.to_string(),
            parameters,
            optimizer: generator.optimizer(),
            database_objects: generator.database_objects(),
            generator,
        }
    }
}
