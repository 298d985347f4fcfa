//! bindery CLI - bind and resolve persistence mapping metadata
//!
//! Loads YAML mapping documents and JSON entity declarations from a directory,
//! runs the full metadata build and reports the result.

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use bindery::{Environment, Metadata, MetadataBuilder, MetadataSources, ProcessingOrder};

#[derive(Parser)]
#[command(name = "bindery")]
#[command(version, about = "Metadata binding and cross-reference resolution for persistence mappings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build metadata and print a summary
    Validate {
        /// Directory containing .yaml mapping documents and .json declarations
        #[arg(short, long, default_value = "config/examples/shop")]
        sources: PathBuf,

        /// Environment file (YAML); BINDERY_* variables are used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Which source family binds first (document-first, declaration-first)
        #[arg(short, long)]
        order: Option<String>,
    },

    /// Build metadata and print it as JSON
    Describe {
        /// Directory containing .yaml mapping documents and .json declarations
        #[arg(short, long, default_value = "config/examples/shop")]
        sources: PathBuf,

        /// Environment file (YAML); BINDERY_* variables are used when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Which source family binds first (document-first, declaration-first)
        #[arg(short, long)]
        order: Option<String>,

        /// Only print this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut out = io::stdout().lock();

    let result = match cli.command {
        Commands::Validate { sources, config, order } => {
            validate(&mut out, &sources, config.as_deref(), order.as_deref())
        }
        Commands::Describe { sources, config, order, entity, pretty } => describe(
            &mut out,
            &sources,
            config.as_deref(),
            order.as_deref(),
            entity.as_deref(),
            pretty,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Environment from a file or the process environment, then overrides
fn load_environment(config: Option<&Path>, order: Option<&str>) -> Result<Environment, String> {
    let mut environment = match config {
        Some(path) => {
            dotenv::dotenv().ok();
            let mut environment = Environment::from_file(path).map_err(|e| e.to_string())?;
            environment
                .apply_overrides(std::env::vars())
                .map_err(|e| e.to_string())?;
            environment
        }
        None => Environment::from_env().map_err(|e| e.to_string())?,
    };

    if let Some(order) = order {
        environment.processing_order = ProcessingOrder::parse(order).map_err(|e| e.to_string())?;
    }
    Ok(environment)
}

fn build(sources: &Path, config: Option<&Path>, order: Option<&str>) -> Result<Metadata, String> {
    let environment = load_environment(config, order)?;
    let sources = MetadataSources::from_directory(sources).map_err(|e| e.to_string())?;
    MetadataBuilder::new(sources, environment)
        .build()
        .map_err(|e| e.to_string())
}

fn write_err(e: io::Error) -> String {
    format!("Failed to write output: {}", e)
}

fn validate(
    out: &mut impl Write,
    sources: &Path,
    config: Option<&Path>,
    order: Option<&str>,
) -> Result<(), String> {
    writeln!(out, "🔍 Building metadata from {}...", sources.display()).map_err(write_err)?;

    let metadata = build(sources, config, order)?;

    writeln!(out, "  ✓ {} entities bound", metadata.entity_bindings().count()).map_err(write_err)?;
    writeln!(out, "  ✓ {} collections bound", metadata.collection_roles().count())
        .map_err(write_err)?;
    writeln!(out, "  ✓ {} imports registered", metadata.imports().len()).map_err(write_err)?;
    writeln!(out, "  ✓ {} named queries", metadata.registries().named_queries.len())
        .map_err(write_err)?;

    let unresolved = metadata.unresolved_types();
    if !unresolved.is_empty() {
        writeln!(out, "  ℹ {} attributes left untyped:", unresolved.len()).map_err(write_err)?;
        for name in unresolved {
            writeln!(out, "    - {}", name).map_err(write_err)?;
        }
    }

    writeln!(out, "✅ Metadata is valid ({})", metadata.processing_order()).map_err(write_err)?;
    Ok(())
}

fn describe(
    out: &mut impl Write,
    sources: &Path,
    config: Option<&Path>,
    order: Option<&str>,
    entity: Option<&str>,
    pretty: bool,
) -> Result<(), String> {
    let metadata = build(sources, config, order)?;

    let value = match entity {
        Some(name) => {
            let binding = metadata
                .entity_binding(name)
                .ok_or_else(|| format!("Unknown entity: {}", name))?;
            serde_json::to_value(binding)
        }
        None => serde_json::to_value(&metadata),
    }
    .map_err(|e| format!("Failed to serialize metadata: {}", e))?;

    let output = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|e| format!("Failed to serialize metadata: {}", e))?;

    writeln!(out, "{}", output).map_err(write_err)?;
    Ok(())
}
