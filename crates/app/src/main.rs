use chrono::Utc;
use clap::{Parser, Subcommand};
use manual_retrieval_core::{
    discover_manual_files, migrate, AnswerAssembler, Backend, DocumentIngestor, EngineConfig,
    Manual, QueryContext, QueryEngine, QueryLog, QueryLogEntry,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "manual-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector backend: file, local or remote. Overrides VECTOR_BACKEND.
    #[arg(long, env = "VECTOR_BACKEND")]
    backend: Option<String>,

    /// Vector store endpoint for local/remote backends.
    #[arg(long, env = "VECTOR_ENDPOINT")]
    endpoint: Option<String>,

    /// Collection holding manual chunks.
    #[arg(long, env = "VECTOR_COLLECTION")]
    collection: Option<String>,

    /// Query audit log path (JSONL).
    #[arg(long, default_value = "queries.jsonl")]
    query_log: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Index a manual (PDF or plain text), or every manual in a folder.
    Ingest {
        /// A single file or a folder searched recursively.
        path: PathBuf,
        /// Display name; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
        /// Equipment brand, e.g. "Thermo King".
        #[arg(long)]
        brand: Option<String>,
        /// Unit model covered by the manual, e.g. "SL-400".
        #[arg(long)]
        model: Option<String>,
        /// Manual revision label.
        #[arg(long)]
        revision: Option<String>,
        /// Operator recorded against the upload.
        #[arg(long)]
        uploaded_by: Option<String>,
    },
    /// Ask a diagnostic question against the indexed manuals.
    Query {
        query: String,
        /// Restrict to chunks tagged with this unit model.
        #[arg(long)]
        unit_model: Option<String>,
        /// Restrict to chunks mentioning this alarm code.
        #[arg(long)]
        alarm_code: Option<String>,
        /// Number of chunks to retrieve.
        #[arg(long, default_value = "4")]
        top_k: usize,
        /// Asking user, recorded in the audit log.
        #[arg(long)]
        user: Option<String>,
    },
    /// Copy every record into another backend without re-embedding.
    Migrate {
        /// Destination backend: file, local or remote.
        #[arg(long)]
        dest_backend: String,
        /// Destination endpoint for local/remote.
        #[arg(long)]
        dest_endpoint: Option<String>,
        /// Destination credential for remote.
        #[arg(long, env = "DEST_API_KEY")]
        dest_api_key: Option<String>,
        /// Destination collection; defaults to the source collection.
        #[arg(long)]
        dest_collection: Option<String>,
        /// Records copied per page.
        #[arg(long, default_value = "500")]
        batch_size: usize,
    },
    /// Print collection statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = engine_config(&cli)?;
    let store = config.build_store()?;
    let embedder = config.build_embedder()?;

    info!(
        version = app_version,
        backend = ?config.backend,
        collection = %config.collection,
        started_at = %Utc::now().to_rfc3339(),
        "manual-retrieval boot"
    );

    match cli.command {
        Command::Ingest {
            path,
            name,
            brand,
            model,
            revision,
            uploaded_by,
        } => {
            let ingestor =
                DocumentIngestor::new(store, embedder, config.ingestor_config())?;
            let abort = AtomicBool::new(false);

            let files = if path.is_dir() {
                discover_manual_files(&path)
            } else {
                vec![path.clone()]
            };
            if files.is_empty() {
                println!("no manuals found under {}", path.display());
                return Ok(());
            }

            let mut total_chunks = 0usize;
            let mut failures = 0usize;
            for file in &files {
                let mut manual = manual_for(file, name.as_deref());
                manual.brand = brand.clone();
                manual.model = model.clone();
                manual.version = revision.clone();
                manual.uploaded_by = uploaded_by.clone();

                let report = ingestor.ingest_file(&manual, file, &abort).await;
                if let Some(error) = &report.error {
                    failures += 1;
                    warn!(path = %file.display(), error = %error, "manual partially indexed");
                }
                total_chunks += report.chunks_created;
                println!(
                    "{}: {}/{} chunks in {}ms",
                    file.display(),
                    report.chunks_created,
                    report.total_chunks,
                    report.duration_ms
                );
            }

            println!(
                "{} chunks indexed from {} file(s), {} failure(s)",
                total_chunks,
                files.len(),
                failures
            );
        }
        Command::Query {
            query,
            unit_model,
            alarm_code,
            top_k,
            user,
        } => {
            let engine = QueryEngine::new(store, embedder).with_top_k(top_k);
            let context = QueryContext {
                unit_model,
                alarm_code,
                user,
            };

            let retrieval = engine.retrieve(&query, &context).await?;
            let answer = AnswerAssembler::extractive()
                .assemble(&query, &retrieval)
                .await?;

            let log = QueryLog::new(&cli.query_log);
            let entry = QueryLogEntry::from_exchange(&query, &context, &retrieval, &answer);
            if let Err(error) = log.append(&entry) {
                warn!(path = %log.path().display(), error = %error, "query log write failed");
            }

            println!("confidence: {:?}", answer.confidence);
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!("sources:");
                for source in &answer.sources {
                    match source.page {
                        Some(page) => println!("  {} (page {page})", source.manual_name),
                        None => println!("  {}", source.manual_name),
                    }
                }
            }
            if !answer.suggested_parts.is_empty() {
                println!("suggested parts: {}", answer.suggested_parts.join(", "));
            }
            if !answer.references.is_empty() {
                println!("references: {}", answer.references.join("; "));
            }
        }
        Command::Migrate {
            dest_backend,
            dest_endpoint,
            dest_api_key,
            dest_collection,
            batch_size,
        } => {
            let mut dest_config = config.clone();
            dest_config.backend = Backend::parse(&dest_backend)?;
            if let Some(endpoint) = dest_endpoint {
                dest_config.endpoint = endpoint;
            }
            dest_config.api_key = dest_api_key;
            if let Some(collection) = dest_collection {
                dest_config.collection = collection;
            }
            dest_config.validate()?;
            let dest = dest_config.build_store()?;

            let abort = AtomicBool::new(false);
            let report = migrate(store.as_ref(), dest.as_ref(), batch_size, &abort).await?;
            println!(
                "migrated {} record(s), skipped {}",
                report.migrated, report.skipped
            );
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!(
                "{} chunk(s) across {} manual(s) in collection {}",
                stats.count, stats.distinct_owners, config.collection
            );
        }
    }

    Ok(())
}

fn engine_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::from_env()?;
    if let Some(backend) = &cli.backend {
        config.backend = Backend::parse(backend)?;
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(collection) = &cli.collection {
        config.collection = collection.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Manual identity derived from the file name: stable across re-ingestions
/// of the same file so the old chunks get replaced, not duplicated.
fn manual_for(path: &Path, name: Option<&str>) -> Manual {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "manual".to_string());
    let id: String = stem
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let display = name.map(str::to_string).unwrap_or(stem);
    Manual::new(&id, &display, path.to_string_lossy().as_ref())
}
