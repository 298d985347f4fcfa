//! Directory loader for mapping sources.
//!
//! `.yaml`/`.yml` files are mapping documents, `.json` files hold one entity
//! declaration or an array of them. Files are read in file-name order so the
//! binding order is reproducible.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MappingError;
use crate::metadata::MetadataSources;
use crate::source::types::{AttributeSource, DeclaredEntity, EntitySource, MappingDocument, Origin};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<DeclaredEntity>),
    One(Box<DeclaredEntity>),
}

/// Load every mapping source in a directory
///
/// # Arguments
///
/// * `dir` - Directory containing `.yaml`, `.yml` and `.json` sources
///
/// # Example
///
/// ```ignore
/// use bindery::source::load_sources;
///
/// let sources = load_sources("config/examples/shop").unwrap();
/// ```
pub fn load_sources<P: AsRef<Path>>(dir: P) -> Result<MetadataSources, MappingError> {
    let dir_path = dir.as_ref();

    if !dir_path.is_dir() {
        return Err(MappingError::InvalidSource {
            reason: format!("not a directory: {}", dir_path.display()),
        });
    }

    let read_dir = fs::read_dir(dir_path).map_err(|source| MappingError::Io {
        path: dir_path.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| MappingError::Io {
            path: dir_path.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    paths.sort();

    let mut sources = MetadataSources::new();
    for path in paths {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => {
                let document = load_document(&path)?;
                sources.add_document(Origin::file(&path), document);
            }
            Some("json") => {
                for declared in load_declarations(&path)? {
                    sources.add_declaration(Origin::file(&path), declared);
                }
            }
            _ => {
                tracing::debug!("Skipping non-mapping file {}", path.display());
            }
        }
    }

    tracing::info!(
        "Loaded {} documents and {} declarations from {}",
        sources.documents().len(),
        sources.declarations().len(),
        dir_path.display()
    );

    Ok(sources)
}

/// Load a single mapping document from a YAML file
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<MappingDocument, MappingError> {
    let path = path.as_ref();
    let content = read(path)?;
    let document: MappingDocument =
        serde_yaml::from_str(&content).map_err(|source| MappingError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

    for entity in &document.entities {
        validate_entity(entity).map_err(|e| e.in_origin(&Origin::file(path)))?;
    }

    Ok(document)
}

/// Load one declaration, or an array of declarations, from a JSON file
pub fn load_declarations<P: AsRef<Path>>(path: P) -> Result<Vec<DeclaredEntity>, MappingError> {
    let path = path.as_ref();
    let content = read(path)?;
    let parsed: OneOrMany = serde_json::from_str(&content).map_err(|source| MappingError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let declarations = match parsed {
        OneOrMany::Many(many) => many,
        OneOrMany::One(one) => vec![*one],
    };

    for declared in &declarations {
        validate_entity(&declared.entity).map_err(|e| e.in_origin(&Origin::file(path)))?;
    }

    Ok(declarations)
}

fn read(path: &Path) -> Result<String, MappingError> {
    fs::read_to_string(path).map_err(|source| MappingError::Io {
        path: PathBuf::from(path),
        source,
    })
}

/// Validate the names a source must carry
pub fn validate_entity(entity: &EntitySource) -> Result<(), MappingError> {
    if entity.name.trim().is_empty() {
        return Err(MappingError::InvalidSource {
            reason: "entity name cannot be empty".to_string(),
        });
    }

    if entity.extends.is_some() && entity.inheritance.is_some() {
        return Err(MappingError::InvalidSource {
            reason: format!(
                "entity '{}' extends another entity and cannot declare an inheritance strategy",
                entity.name
            ),
        });
    }

    for attribute in &entity.attributes {
        validate_attribute(attribute, &entity.name)?;
    }

    for sub in &entity.subclasses {
        validate_entity(sub)?;
    }

    Ok(())
}

fn validate_attribute(attribute: &AttributeSource, entity_name: &str) -> Result<(), MappingError> {
    if attribute.name().trim().is_empty() {
        return Err(MappingError::InvalidSource {
            reason: format!("attribute name cannot be empty in entity '{}'", entity_name),
        });
    }

    if let AttributeSource::Embedded(embedded) = attribute {
        for nested in &embedded.attributes {
            validate_attribute(nested, entity_name)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_entity_requires_name() {
        let entity: EntitySource = serde_yaml::from_str("name: ''").unwrap();
        assert!(validate_entity(&entity).is_err());
    }

    #[test]
    fn test_validate_subclass_cannot_choose_strategy() {
        let entity: EntitySource =
            serde_yaml::from_str("name: Child\nextends: Parent\ninheritance: joined").unwrap();
        assert!(validate_entity(&entity).is_err());
    }

    #[test]
    fn test_validate_nested_attribute_names() {
        let yaml = r#"
name: Customer
attributes:
  - kind: embedded
    name: address
    attributes:
      - kind: basic
        name: ""
"#;
        let entity: EntitySource = serde_yaml::from_str(yaml).unwrap();
        let err = validate_entity(&entity).unwrap_err();
        assert!(err.to_string().contains("Customer"));
    }

    #[test]
    fn test_load_sources_in_file_name_order() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("b.yaml"),
            "package: com.example\nentities:\n  - name: B\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.yml"),
            "package: com.example\nentities:\n  - name: A\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("c.json"),
            r#"[{"name": "com.example.C"}, {"name": "com.example.D"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sources = load_sources(dir.path()).unwrap();
        let documents = sources.documents();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].1.entities[0].name, "A");
        assert_eq!(documents[1].1.entities[0].name, "B");
        assert!(documents[0].0.name.ends_with("a.yml"));

        let declarations = sources.declarations();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[1].1.entity.name, "com.example.D");
    }

    #[test]
    fn test_load_single_declaration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("customer.json");
        fs::write(&path, r#"{"name": "com.example.Customer"}"#).unwrap();

        let declarations = load_declarations(&path).unwrap();
        assert_eq!(declarations.len(), 1);
    }

    #[test]
    fn test_load_document_reports_yaml_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "entities: [").unwrap();

        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, MappingError::Yaml { .. }));
    }

    #[test]
    fn test_load_sources_missing_directory() {
        let err = load_sources("/definitely/not/here").unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
