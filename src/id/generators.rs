//! Built-in identifier generator strategies.

use std::sync::Arc;

use super::{
    GeneratorConfig, GeneratorError, IdentifierGenerator, OptimizerKind, CATALOG,
    INCREMENT_SIZE, INITIAL_VALUE, OPTIMIZER, PREFER_POOLED_LO, PROPERTY, SCHEMA,
    SEGMENT_VALUE, SEQUENCE_NAME, TABLE_NAME, TARGET_COLUMN, TARGET_TABLE,
};
use crate::types::SqlType;

pub const DEFAULT_SEQUENCE_NAME: &str = "hibernate_sequence";
pub const DEFAULT_TABLE_NAME: &str = "hibernate_sequences";
pub const DEFAULT_SEGMENT_VALUE: &str = "default";

/// Values supplied by the application
#[derive(Debug, Clone, Default)]
pub struct AssignedGenerator;

impl IdentifierGenerator for AssignedGenerator {
    fn strategy(&self) -> &str {
        "assigned"
    }
}

/// In-memory counter seeded from `max(column)`
#[derive(Debug, Clone)]
pub struct IncrementGenerator {
    pub table: String,
    pub column: String,
}

impl IdentifierGenerator for IncrementGenerator {
    fn strategy(&self) -> &str {
        "increment"
    }

    fn database_objects(&self) -> Vec<String> {
        vec![self.table.clone()]
    }
}

/// Database identity column
#[derive(Debug, Clone, Default)]
pub struct IdentityGenerator;

impl IdentifierGenerator for IdentityGenerator {
    fn strategy(&self) -> &str {
        "identity"
    }

    fn is_post_insert(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct SequenceStyleGenerator {
    pub sequence_name: String,
    pub initial_value: i64,
    pub increment_size: i64,
    pub optimizer: OptimizerKind,
}

impl IdentifierGenerator for SequenceStyleGenerator {
    fn strategy(&self) -> &str {
        "sequence"
    }

    fn database_objects(&self) -> Vec<String> {
        vec![self.sequence_name.clone()]
    }

    fn optimizer(&self) -> OptimizerKind {
        self.optimizer
    }

    fn increment_size(&self) -> i64 {
        self.increment_size
    }
}

/// Values allocated from a row per segment in a generator table
#[derive(Debug, Clone)]
pub struct TableGenerator {
    pub table_name: String,
    pub segment_value: String,
    pub initial_value: i64,
    pub increment_size: i64,
    pub optimizer: OptimizerKind,
}

impl IdentifierGenerator for TableGenerator {
    fn strategy(&self) -> &str {
        "table"
    }

    fn database_objects(&self) -> Vec<String> {
        vec![self.table_name.clone()]
    }

    fn optimizer(&self) -> OptimizerKind {
        self.optimizer
    }

    fn increment_size(&self) -> i64 {
        self.increment_size
    }
}

#[derive(Debug, Clone, Default)]
pub struct UuidGenerator;

impl IdentifierGenerator for UuidGenerator {
    fn strategy(&self) -> &str {
        "uuid"
    }
}

/// Copies the identifier of the entity reached through `property`
#[derive(Debug, Clone)]
pub struct ForeignGenerator {
    pub property: String,
}

impl IdentifierGenerator for ForeignGenerator {
    fn strategy(&self) -> &str {
        "foreign"
    }
}

pub fn assigned(_config: &GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
    Ok(Arc::new(AssignedGenerator))
}

pub fn increment(config: &GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
    require_integral("increment", config)?;
    let table = qualified_object_name(config, config.parameter(TARGET_TABLE).unwrap_or_default());
    Ok(Arc::new(IncrementGenerator {
        table,
        column: config.parameter(TARGET_COLUMN).unwrap_or_default().to_string(),
    }))
}

pub fn identity(config: &GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
    require_integral("identity", config)?;
    Ok(Arc::new(IdentityGenerator))
}

pub fn sequence(config: &GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
    require_numeric("sequence", config)?;
    let increment_size = config.int_parameter(INCREMENT_SIZE, 1)?;
    let name = config.parameter(SEQUENCE_NAME).unwrap_or(DEFAULT_SEQUENCE_NAME);
    Ok(Arc::new(SequenceStyleGenerator {
        sequence_name: qualified_object_name(config, name),
        initial_value: config.int_parameter(INITIAL_VALUE, 1)?,
        increment_size,
        optimizer: optimizer(config, increment_size)?,
    }))
}

pub fn table(config: &GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
    require_numeric("table", config)?;
    let increment_size = config.int_parameter(INCREMENT_SIZE, 1)?;
    let name = config.parameter(TABLE_NAME).unwrap_or(DEFAULT_TABLE_NAME);
    let segment_value = config
        .parameter(SEGMENT_VALUE)
        .or_else(|| config.parameter(TARGET_TABLE))
        .unwrap_or(DEFAULT_SEGMENT_VALUE);
    Ok(Arc::new(TableGenerator {
        table_name: qualified_object_name(config, name),
        segment_value: segment_value.to_string(),
        initial_value: config.int_parameter(INITIAL_VALUE, 1)?,
        increment_size,
        optimizer: optimizer(config, increment_size)?,
    }))
}

pub fn uuid(config: &GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
    match config.identifier_type.sql_type {
        Some(SqlType::Char)
        | Some(SqlType::Varchar)
        | Some(SqlType::Binary)
        | Some(SqlType::Varbinary)
        | Some(SqlType::Other) => Ok(Arc::new(UuidGenerator)),
        _ => Err(incompatible("uuid", config)),
    }
}

pub fn foreign(config: &GeneratorConfig<'_>) -> Result<Arc<dyn IdentifierGenerator>, GeneratorError> {
    let property = config
        .parameter(PROPERTY)
        .ok_or_else(|| GeneratorError::MissingParameter {
            strategy: "foreign".to_string(),
            parameter: PROPERTY.to_string(),
        })?;
    Ok(Arc::new(ForeignGenerator {
        property: property.to_string(),
    }))
}

/// Pick the optimizer: explicit `optimizer`, else pooled for increments above one.
fn optimizer(config: &GeneratorConfig<'_>, increment_size: i64) -> Result<OptimizerKind, GeneratorError> {
    if let Some(explicit) = config.parameter(OPTIMIZER) {
        return match explicit.trim().to_lowercase().replace('_', "-").as_str() {
            "none" => Ok(OptimizerKind::None),
            "pooled" => Ok(OptimizerKind::Pooled),
            "pooled-lo" => Ok(OptimizerKind::PooledLo),
            _ => Err(GeneratorError::InvalidParameter {
                parameter: OPTIMIZER.to_string(),
                value: explicit.to_string(),
            }),
        };
    }

    if increment_size <= 1 {
        return Ok(OptimizerKind::None);
    }

    if config.bool_parameter(PREFER_POOLED_LO, false)? {
        Ok(OptimizerKind::PooledLo)
    } else {
        Ok(OptimizerKind::Pooled)
    }
}

fn qualified_object_name(config: &GeneratorConfig<'_>, name: &str) -> String {
    let mut parts = Vec::new();
    for key in [CATALOG, SCHEMA] {
        if let Some(part) = config.parameter(key).filter(|part| !part.is_empty()) {
            parts.push(config.normalizer.normalize_identifier_quoting(part).render());
        }
    }
    parts.push(config.normalizer.normalize_identifier_quoting(name).render());
    parts.join(".")
}

fn require_integral(strategy: &str, config: &GeneratorConfig<'_>) -> Result<(), GeneratorError> {
    match config.identifier_type.sql_type {
        Some(sql_type) if sql_type.is_integral() => Ok(()),
        _ => Err(incompatible(strategy, config)),
    }
}

fn require_numeric(strategy: &str, config: &GeneratorConfig<'_>) -> Result<(), GeneratorError> {
    match config.identifier_type.sql_type {
        Some(sql_type) if sql_type.is_numeric() => Ok(()),
        _ => Err(incompatible(strategy, config)),
    }
}

fn incompatible(strategy: &str, config: &GeneratorConfig<'_>) -> GeneratorError {
    GeneratorError::IncompatibleType {
        strategy: strategy.to_string(),
        type_name: config.identifier_type.name.clone(),
    }
}
