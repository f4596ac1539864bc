//! `sciflow`: CLI sobre el pipeline de sustancias.
//!
//! Proveedores, normalizador y molfiles se leen de `--fixtures`. Con
//! `DATABASE_URL` definido se usa Postgres; si no, un repositorio en memoria
//! que vive lo que dura el proceso.
use clap::{Parser, Subcommand};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chem_core::{ReferenceData, RepositoryError, SourceAggregator, SubstanceRepository, SubstanceResolver};
use chem_domain::{classify, ConnectionTable, ElementTable};
use chem_persistence::{DbConfig, PgSubstanceRepository, PoolProvider};
use chem_providers::{discover_providers, FixtureNormalizer, FixtureStructureSource};
use chem_scidata::{bundled_compound_template, MolecularGraphBuilder};
use sciflow_rust::{AppConfig, CompoundPipeline, FileSink, IngestError};

#[derive(Parser)]
#[command(name = "sciflow", version, about = "Resolve chemical identifiers into canonical substances and SciData documents")]
struct Cli {
    /// Directorio de fixtures (proveedores, sinónimos, molfiles).
    #[arg(long, global = true, default_value = "fixtures")]
    fixtures: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identifier kind.
    Classify { identifier: String },
    /// Resolve an identifier to its canonical substance.
    Resolve { identifier: String },
    /// Build the SciData document of a substance.
    Document {
        identifier: String,
        /// Write the document here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Case-insensitive substring search over stored identifiers.
    Search { query: String },
    /// Build the molecular graph section of a V2000 molfile.
    Molgraph { molfile: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                             .with_writer(std::io::stderr)
                             .init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), IngestError> {
    match &cli.command {
        Commands::Classify { identifier } => {
            println!("{}", classify(identifier));
            Ok(())
        }
        Commands::Molgraph { molfile } => molgraph(molfile),
        _ => {
            let config = AppConfig::from_env()?;
            match DbConfig::from_env_opt().map_err(|e| IngestError::Configuration(e.to_string()))? {
                Some(db) => {
                    let pool = chem_persistence::build_pool(&db.url, db.min_connections, db.max_connections).map_err(storage)?;
                    let repo = PgSubstanceRepository::with_bundled_elements(PoolProvider { pool }).map_err(storage)?;
                    if let Err(RepositoryError::NotFound(_)) = repo.get_template(&config.template_category) {
                        warn!("template '{}' missing from database, installing bundled one", config.template_category);
                        repo.save_template(&bundled_compound_template()?)?;
                    }
                    with_repository(Arc::new(repo), &cli, &config).await
                }
                None => {
                    debug!("DATABASE_URL not set, using in-memory repository");
                    let repo = chem_core::InMemorySubstanceRepository::with_bundled_elements()?;
                    repo.insert_template(bundled_compound_template()?)?;
                    with_repository(Arc::new(repo), &cli, &config).await
                }
            }
        }
    }
}

fn storage(e: chem_persistence::PersistenceError) -> IngestError {
    IngestError::from(RepositoryError::from(e))
}

async fn with_repository<R: SubstanceRepository + ?Sized>(repo: Arc<R>, cli: &Cli, config: &AppConfig) -> Result<(), IngestError> {
    let providers = discover_providers(&cli.fixtures).map_err(|e| IngestError::Configuration(format!("fixtures: {e}")))?;
    let normalizer = FixtureNormalizer::load(&cli.fixtures).map_err(|e| IngestError::Configuration(format!("fixtures: {e}")))?;
    let aggregator = SourceAggregator::new(providers, config.aggregator.clone())?;
    let resolver = SubstanceResolver::new(Arc::clone(&repo), Arc::new(normalizer), aggregator, config.resolver.clone());

    match &cli.command {
        Commands::Resolve { identifier } => {
            let resolved = resolver.resolve(identifier).await?;
            eprintln!("{}", sciflow_rust::IngestStatus::from(resolved.status).user_message());
            print_json(&resolved)
        }
        Commands::Document { identifier, out } => {
            let mut pipeline = CompoundPipeline::new(resolver, &config.template_category)
                .with_structures(Arc::new(FixtureStructureSource::new(&cli.fixtures)));
            if let Some(path) = out {
                pipeline = pipeline.with_sink(Arc::new(FileSink::new(path)));
            }
            let report = pipeline.ingest(identifier).await?;
            eprintln!("{}", report.status.user_message());
            match out {
                Some(path) => {
                    eprintln!("document written to {}", path.display());
                    Ok(())
                }
                None => {
                    println!("{}", report.document.to_pretty_json()?);
                    Ok(())
                }
            }
        }
        Commands::Search { query } => print_json(&repo.search(query)?),
        Commands::Classify { .. } | Commands::Molgraph { .. } => Ok(()),
    }
}

fn molgraph(path: &Path) -> Result<(), IngestError> {
    let raw = std::fs::read_to_string(path).map_err(|e| IngestError::Configuration(format!("{}: {e}", path.display())))?;
    let table = ConnectionTable::from_molfile(&raw).map_err(|e| IngestError::Core(e.into()))?;
    let elements = ElementTable::bundled().map_err(|e| IngestError::Core(e.into()))?;
    let graph = MolecularGraphBuilder::new(elements).build(&table)?;
    print_json(&graph)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), IngestError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| IngestError::Document(e.into()))?;
    println!("{json}");
    Ok(())
}
