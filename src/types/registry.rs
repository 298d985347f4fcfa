//! Basic type registry and heuristic type lookup.

use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::{BasicType, ResolvedType, SqlType, TypeDefinition, TypeError};

/// Upper bound on chained type definitions
const MAX_DEFINITION_DEPTH: usize = 16;

fn parameterized_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_ ]*?)\s*\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)\s*$")
            .expect("parameterized type pattern is valid")
    })
}

/// Registry of basic types and type definitions
///
/// Lookup order: type definitions, then basic types by any registered key,
/// then a parameterized form such as `varchar(255)` or `decimal(10,2)`.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<BasicType>,
    keys: HashMap<String, usize>,
    definitions: IndexMap<String, TypeDefinition>,
}

impl TypeRegistry {
    /// Create a registry without any types
    pub fn empty() -> Self {
        Self {
            types: Vec::new(),
            keys: HashMap::new(),
            definitions: IndexMap::new(),
        }
    }

    /// Create a registry holding the standard basic types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for basic in standard_types() {
            registry.register(basic);
        }
        registry
    }

    /// Register a basic type under all of its keys; later registrations win.
    pub fn register(&mut self, basic: BasicType) {
        let index = self.types.len();
        for key in &basic.keys {
            if let Some(previous) = self.keys.insert(key.clone(), index) {
                tracing::debug!(
                    "Type key '{}' moved from {} to {}",
                    key,
                    self.types[previous].name,
                    basic.name
                );
            }
        }
        self.types.push(basic);
    }

    /// Add a type definition, found by name and by its registration keys.
    pub fn add_definition(&mut self, definition: TypeDefinition) {
        for key in &definition.registration_keys {
            self.definitions.insert(key.clone(), definition.clone());
        }
        if self
            .definitions
            .insert(definition.name.clone(), definition.clone())
            .is_some()
        {
            tracing::warn!("Type definition '{}' replaced", definition.name);
        }
    }

    pub fn basic(&self, key: &str) -> Option<&BasicType> {
        self.keys
            .get(key)
            .or_else(|| self.keys.get(&key.to_lowercase()))
            .map(|index| &self.types[*index])
    }

    pub fn definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.definitions.get(name)
    }

    /// Distinct type definitions in registration order
    pub fn definitions(&self) -> Vec<&TypeDefinition> {
        let mut seen = Vec::new();
        for definition in self.definitions.values() {
            if !seen.iter().any(|d: &&TypeDefinition| d.name == definition.name) {
                seen.push(definition);
            }
        }
        seen
    }

    /// Resolve a type name with parameters
    ///
    /// # Returns
    ///
    /// * `Ok(ResolvedType)` - The name matched a definition, a basic type or a parameterized form
    /// * `Err(TypeError)` - Nothing matched
    pub fn heuristic_type(
        &self,
        name: &str,
        parameters: &IndexMap<String, String>,
    ) -> Result<ResolvedType, TypeError> {
        self.lookup(name, parameters, 0)
    }

    fn lookup(
        &self,
        name: &str,
        parameters: &IndexMap<String, String>,
        depth: usize,
    ) -> Result<ResolvedType, TypeError> {
        if depth > MAX_DEFINITION_DEPTH {
            return Err(TypeError::Circular {
                name: name.to_string(),
            });
        }

        if let Some(definition) = self.definitions.get(name) {
            let mut merged = definition.parameters.clone();
            for (key, value) in parameters {
                merged.insert(key.clone(), value.clone());
            }
            let mut resolved = self.lookup(&definition.implementation, &merged, depth + 1)?;
            resolved.name = definition.name.clone();
            return Ok(resolved);
        }

        if let Some(basic) = self.basic(name) {
            return Ok(basic.to_resolved(parameters));
        }

        if let Some(captures) = parameterized_pattern().captures(name) {
            let base = &captures[1];
            let basic = self.basic(base).ok_or_else(|| TypeError::Unknown {
                name: name.to_string(),
            })?;

            let mut merged = IndexMap::new();
            let first = number(name, "length", &captures[2])?;
            match captures.get(3) {
                Some(scale) => {
                    merged.insert("precision".to_string(), first.to_string());
                    merged.insert(
                        "scale".to_string(),
                        number(name, "scale", scale.as_str())?.to_string(),
                    );
                }
                None => {
                    let key = if basic.sql_type.is_numeric() {
                        "precision"
                    } else {
                        "length"
                    };
                    merged.insert(key.to_string(), first.to_string());
                }
            }
            for (key, value) in parameters {
                merged.insert(key.clone(), value.clone());
            }
            return Ok(basic.to_resolved(&merged));
        }

        Err(TypeError::Unknown {
            name: name.to_string(),
        })
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn number(name: &str, parameter: &str, text: &str) -> Result<u32, TypeError> {
    text.parse().map_err(|_| TypeError::InvalidParameter {
        name: name.to_string(),
        parameter: parameter.to_string(),
        value: text.to_string(),
    })
}

fn standard_types() -> Vec<BasicType> {
    vec![
        BasicType::new("boolean", SqlType::Boolean, "bool", &["bool", "java.lang.Boolean"]),
        BasicType::new("byte", SqlType::TinyInt, "i8", &["i8", "tinyint", "java.lang.Byte"]),
        BasicType::new("short", SqlType::SmallInt, "i16", &["i16", "smallint", "java.lang.Short"]),
        BasicType::new(
            "integer",
            SqlType::Integer,
            "i32",
            &["int", "i32", "u16", "java.lang.Integer"],
        ),
        BasicType::new(
            "long",
            SqlType::BigInt,
            "i64",
            &["i64", "u32", "bigint", "java.lang.Long"],
        ),
        BasicType::new("float", SqlType::Float, "f32", &["f32", "real", "java.lang.Float"]),
        BasicType::new("double", SqlType::Double, "f64", &["f64", "java.lang.Double"]),
        BasicType::new(
            "big_decimal",
            SqlType::Numeric,
            "Decimal",
            &["decimal", "numeric", "java.math.BigDecimal"],
        ),
        BasicType::new(
            "big_integer",
            SqlType::Numeric,
            "BigInt",
            &["i128", "java.math.BigInteger"],
        ),
        BasicType::new("character", SqlType::Char, "char", &["char", "java.lang.Character"]),
        BasicType::new(
            "string",
            SqlType::Varchar,
            "String",
            &["String", "varchar", "&str", "java.lang.String"],
        ),
        BasicType::new("text", SqlType::LongVarchar, "String", &["longvarchar"]),
        BasicType::new("date", SqlType::Date, "NaiveDate", &["NaiveDate", "java.sql.Date"]),
        BasicType::new("time", SqlType::Time, "NaiveTime", &["NaiveTime", "java.sql.Time"]),
        BasicType::new(
            "timestamp",
            SqlType::Timestamp,
            "NaiveDateTime",
            &[
                "NaiveDateTime",
                "DateTime<Utc>",
                "datetime",
                "java.sql.Timestamp",
                "java.util.Date",
            ],
        ),
        BasicType::new("binary", SqlType::Varbinary, "Vec<u8>", &["Vec<u8>", "varbinary", "byte[]"]),
        BasicType::new("uuid", SqlType::Binary, "Uuid", &["Uuid", "java.util.UUID"]),
        BasicType::new("blob", SqlType::Blob, "Vec<u8>", &["java.sql.Blob"]),
        BasicType::new("clob", SqlType::Clob, "String", &["java.sql.Clob"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_params() -> IndexMap<String, String> {
        IndexMap::new()
    }

    #[test]
    fn test_basic_lookup_by_alias() {
        let registry = TypeRegistry::new();
        let resolved = registry.heuristic_type("java.lang.Long", &no_params()).unwrap();
        assert_eq!(resolved.name, "long");
        assert_eq!(resolved.sql_type, Some(SqlType::BigInt));
        assert_eq!(resolved.value_type, "i64");

        let resolved = registry.heuristic_type("String", &no_params()).unwrap();
        assert_eq!(resolved.name, "string");
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.heuristic_type("VARCHAR", &no_params()).unwrap().name,
            "string"
        );
    }

    #[test]
    fn test_parameterized_forms() {
        let registry = TypeRegistry::new();

        let varchar = registry.heuristic_type("varchar(255)", &no_params()).unwrap();
        assert_eq!(varchar.name, "string");
        assert_eq!(varchar.parameter("length"), Some("255"));

        let decimal = registry.heuristic_type("decimal(10, 2)", &no_params()).unwrap();
        assert_eq!(decimal.name, "big_decimal");
        assert_eq!(decimal.parameter("precision"), Some("10"));
        assert_eq!(decimal.parameter("scale"), Some("2"));

        let mut explicit = IndexMap::new();
        explicit.insert("length".to_string(), "40".to_string());
        let overridden = registry.heuristic_type("varchar(255)", &explicit).unwrap();
        assert_eq!(overridden.parameter("length"), Some("40"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.heuristic_type("com.example.Money", &no_params()),
            Err(TypeError::Unknown {
                name: "com.example.Money".to_string()
            })
        );
        assert!(registry.heuristic_type("money(4)", &no_params()).is_err());
    }

    #[test]
    fn test_definition_takes_precedence() {
        let mut registry = TypeRegistry::new();
        let mut parameters = IndexMap::new();
        parameters.insert("length".to_string(), "3".to_string());
        registry.add_definition(TypeDefinition {
            name: "currency_code".to_string(),
            implementation: "string".to_string(),
            registration_keys: vec!["com.example.Currency".to_string()],
            parameters,
        });

        let resolved = registry
            .heuristic_type("com.example.Currency", &no_params())
            .unwrap();
        assert_eq!(resolved.name, "currency_code");
        assert_eq!(resolved.sql_type, Some(SqlType::Varchar));
        assert_eq!(resolved.parameter("length"), Some("3"));
        assert_eq!(registry.definitions().len(), 1);
    }

    #[test]
    fn test_circular_definitions() {
        let mut registry = TypeRegistry::new();
        registry.add_definition(TypeDefinition {
            name: "a".to_string(),
            implementation: "b".to_string(),
            registration_keys: Vec::new(),
            parameters: IndexMap::new(),
        });
        registry.add_definition(TypeDefinition {
            name: "b".to_string(),
            implementation: "a".to_string(),
            registration_keys: Vec::new(),
            parameters: IndexMap::new(),
        });
        assert!(matches!(
            registry.heuristic_type("a", &no_params()),
            Err(TypeError::Circular { .. })
        ));
    }

    #[test]
    fn test_register_overrides_key() {
        let mut registry = TypeRegistry::new();
        registry.register(BasicType::new("money", SqlType::Decimal, "Money", &["decimal"]));
        assert_eq!(registry.basic("decimal").unwrap().name, "money");
        assert_eq!(registry.basic("big_decimal").unwrap().name, "big_decimal");
    }
}
