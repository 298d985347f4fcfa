//! Build environment configuration.
//!
//! The [`Environment`] carries every process-wide setting the binding engine
//! consults: naming strategy, quoting, scope defaults, processing order and
//! verbatim properties handed to identifier generators. It is read from a YAML
//! file and then adjusted from `BINDERY_*` environment variables.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::naming::{NamingStrategyKind, ObjectNameNormalizer};
use crate::source::{AccessType, ScopeDefaults, SourceFamily};

/// Prefix of environment variables that override file settings
pub const ENV_PREFIX: &str = "BINDERY_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Which source family is bound first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingOrder {
    #[default]
    DocumentFirst,
    DeclarationFirst,
}

impl ProcessingOrder {
    pub fn families(self) -> [SourceFamily; 2] {
        match self {
            ProcessingOrder::DocumentFirst => [SourceFamily::Document, SourceFamily::Declaration],
            ProcessingOrder::DeclarationFirst => {
                [SourceFamily::Declaration, SourceFamily::Document]
            }
        }
    }

    /// Parse either an order name (`declaration-first`) or a precedence list
    /// such as `"declaration, document"` separated by commas, semicolons or
    /// whitespace. Only the first listed family matters.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: "processing_order".to_string(),
            value: value.to_string(),
        };

        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "document-first" | "document_first" => return Ok(ProcessingOrder::DocumentFirst),
            "declaration-first" | "declaration_first" => {
                return Ok(ProcessingOrder::DeclarationFirst)
            }
            _ => {}
        }

        let first = normalized
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .find(|part| !part.is_empty())
            .ok_or_else(invalid)?;

        match first {
            "document" | "documents" | "hbm" => Ok(ProcessingOrder::DocumentFirst),
            "declaration" | "declarations" | "class" => Ok(ProcessingOrder::DeclarationFirst),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ProcessingOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingOrder::DocumentFirst => write!(f, "document-first"),
            ProcessingOrder::DeclarationFirst => write!(f, "declaration-first"),
        }
    }
}

/// Process-wide settings for one metadata build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub naming_strategy: NamingStrategyKind,
    pub globally_quoted_identifiers: bool,
    pub default_schema: Option<String>,
    pub default_catalog: Option<String>,
    pub default_cascade: String,
    pub default_access: String,
    pub default_cache_access: Option<AccessType>,
    pub processing_order: ProcessingOrder,
    /// Passed verbatim to identifier generators
    pub properties: IndexMap<String, String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            naming_strategy: NamingStrategyKind::Default,
            globally_quoted_identifiers: false,
            default_schema: None,
            default_catalog: None,
            default_cascade: "none".to_string(),
            default_access: "property".to_string(),
            default_cache_access: None,
            processing_order: ProcessingOrder::DocumentFirst,
            properties: IndexMap::new(),
        }
    }
}

impl Environment {
    /// Load an environment from a YAML file; missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults adjusted by `BINDERY_*` variables, after loading any `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let mut environment = Self::default();
        environment.apply_overrides(std::env::vars())?;
        Ok(environment)
    }

    /// Apply `BINDERY_*` overrides from the given variables.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(setting) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match setting {
                "NAMING_STRATEGY" => {
                    self.naming_strategy =
                        NamingStrategyKind::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                            key: key.clone(),
                            value: value.clone(),
                        })?;
                }
                "GLOBALLY_QUOTED_IDENTIFIERS" => {
                    self.globally_quoted_identifiers =
                        parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                            key: key.clone(),
                            value: value.clone(),
                        })?;
                }
                "DEFAULT_SCHEMA" => self.default_schema = non_empty(value),
                "DEFAULT_CATALOG" => self.default_catalog = non_empty(value),
                "DEFAULT_CASCADE" => self.default_cascade = value,
                "DEFAULT_ACCESS" => self.default_access = value,
                "PROCESSING_ORDER" => self.processing_order = ProcessingOrder::parse(&value)?,
                other => {
                    tracing::debug!("Ignoring unknown setting {}{}", ENV_PREFIX, other);
                }
            }
        }
        Ok(())
    }

    /// Root of the defaults override stack
    pub fn root_defaults(&self) -> ScopeDefaults {
        ScopeDefaults {
            schema: self.default_schema.clone(),
            catalog: self.default_catalog.clone(),
            access: Some(self.default_access.clone()),
            cascade: Some(self.default_cascade.clone()),
        }
    }

    pub fn name_normalizer(&self) -> ObjectNameNormalizer {
        ObjectNameNormalizer::new(self.naming_strategy.build(), self.globally_quoted_identifiers)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_processing_order_parse() {
        assert_eq!(
            ProcessingOrder::parse("declaration-first").unwrap(),
            ProcessingOrder::DeclarationFirst
        );
        assert_eq!(
            ProcessingOrder::parse("document, declaration").unwrap(),
            ProcessingOrder::DocumentFirst
        );
        assert_eq!(
            ProcessingOrder::parse(" class; hbm").unwrap(),
            ProcessingOrder::DeclarationFirst
        );
        assert_eq!(
            ProcessingOrder::parse("declaration document").unwrap(),
            ProcessingOrder::DeclarationFirst
        );
        assert!(ProcessingOrder::parse("").is_err());
        assert!(ProcessingOrder::parse("xml").is_err());
    }

    #[test]
    fn test_families_follow_order() {
        assert_eq!(
            ProcessingOrder::DeclarationFirst.families(),
            [SourceFamily::Declaration, SourceFamily::Document]
        );
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bindery.yaml");
        fs::write(
            &path,
            "naming_strategy: improved\ndefault_schema: shop\nproperties:\n  increment_size: '10'\n",
        )
        .unwrap();

        let environment = Environment::from_file(&path).unwrap();
        assert_eq!(environment.naming_strategy, NamingStrategyKind::Improved);
        assert_eq!(environment.default_schema.as_deref(), Some("shop"));
        assert_eq!(environment.default_cascade, "none");
        assert_eq!(environment.processing_order, ProcessingOrder::DocumentFirst);
        assert_eq!(environment.properties["increment_size"], "10");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Environment::from_file("/no/such/bindery.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_apply_overrides() {
        let mut environment = Environment::default();
        environment
            .apply_overrides(vars(&[
                ("BINDERY_PROCESSING_ORDER", "declaration, document"),
                ("BINDERY_GLOBALLY_QUOTED_IDENTIFIERS", "yes"),
                ("BINDERY_DEFAULT_CASCADE", "all"),
                ("BINDERY_DEFAULT_SCHEMA", ""),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(environment.processing_order, ProcessingOrder::DeclarationFirst);
        assert!(environment.globally_quoted_identifiers);
        assert_eq!(environment.default_cascade, "all");
        assert_eq!(environment.default_schema, None);
    }

    #[test]
    fn test_apply_overrides_rejects_bad_values() {
        let mut environment = Environment::default();
        let err = environment
            .apply_overrides(vars(&[("BINDERY_NAMING_STRATEGY", "fancy")]))
            .unwrap_err();
        assert!(err.to_string().contains("BINDERY_NAMING_STRATEGY"));
    }

    #[test]
    fn test_root_defaults() {
        let defaults = Environment::default().root_defaults();
        assert_eq!(defaults.cascade.as_deref(), Some("none"));
        assert_eq!(defaults.access.as_deref(), Some("property"));
        assert_eq!(defaults.schema, None);
    }
}
