//! cairn: command-line front end for the content store.
//!
//! Uses Postgres when DATABASE_URL is set. Without it the store is in-memory and
//! only lives for the duration of one command, which is enough for `upload` and
//! `upload-url` dry runs.

use anyhow::Context;
use bytes::Bytes;
use cairn_cli::{
    error_report, exit_code, guess_content_type, parse_tag, EXIT_DAMAGED, EXIT_FAILURE, EXIT_OK,
};
use cairn_core::models::{BulkFile, BulkMode, BulkOptions, UploadMetadata};
use cairn_core::{AppError, Config, ErrorMetadata, LogLevel};
use cairn_db::{FileRepository, InMemoryFileRepository, PgFileRepository};
use cairn_processing::{ContentDigest, ContentHasher};
use cairn_infra::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use cairn_services::FileStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cairn", about = "Deduplicating binary content store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more local files
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Content type; guessed from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
        /// Target folder UUID
        #[arg(long)]
        folder: Option<Uuid>,
        /// Mark the files public
        #[arg(long)]
        public: bool,
        /// Tag as key=value, repeatable
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
        /// Upload several files concurrently
        #[arg(long)]
        parallel: bool,
    },
    /// Download a file from a URL and store it
    UploadUrl {
        url: String,
        /// Name to store the file under; defaults to the last URL segment
        #[arg(long)]
        name: Option<String>,
    },
    /// Show a file's metadata
    Get { id: Uuid },
    /// Look up a stored upload by content, from a local file or a hex digest
    Find {
        /// Local file to hash
        #[arg(required_unless_present = "digest", conflicts_with = "digest")]
        path: Option<PathBuf>,
        /// SHA-256 digest in hex
        #[arg(long)]
        digest: Option<String>,
    },
    /// Re-read stored content and check its length and digest
    Verify { id: Uuid },
    /// Soft-delete a file
    Delete { id: Uuid },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn open_store(config: Config) -> anyhow::Result<FileStore> {
    let repository: Arc<dyn FileRepository> = match config.database_url() {
        Some(url) => {
            let pool = cairn_db::connect(&config, url)
                .await
                .context("Failed to connect to the database")?;
            Arc::new(PgFileRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using an in-memory repository");
            Arc::new(InMemoryFileRepository::new())
        }
    };
    Ok(FileStore::new(config, repository)?)
}

fn upload_metadata(
    path: &std::path::Path,
    content_type: Option<&str>,
    folder: Option<Uuid>,
    public: bool,
    tags: &[(String, String)],
) -> UploadMetadata {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut metadata = UploadMetadata::new(
        name,
        content_type.unwrap_or_else(|| guess_content_type(path)),
    );
    metadata.folder_id = folder;
    metadata.is_public = public;
    metadata.tags = tags.iter().cloned().collect();
    metadata
}

/// Log a failed command at its error's level and print a JSON report on stderr.
fn report_failure(err: &anyhow::Error) -> i32 {
    let Some(app) = err.downcast_ref::<AppError>() else {
        tracing::error!(error = ?err, "Command failed");
        eprintln!(
            "{}",
            serde_json::json!({
                "error": { "code": "CLI_ERROR", "message": format!("{:#}", err), "recoverable": false }
            })
        );
        return EXIT_FAILURE;
    };

    let details = app.detailed_message();
    match app.log_level() {
        LogLevel::Debug => tracing::debug!(error = %details, "Command failed"),
        LogLevel::Warn => tracing::warn!(error = %details, "Command failed"),
        LogLevel::Error => tracing::error!(error = %details, "Command failed"),
    }
    eprintln!("{}", error_report(app));
    exit_code(app)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli).await.unwrap_or_else(|err| report_failure(&err));
    shutdown_telemetry();
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    // Loads .env as a side effect, so LOG_FORMAT from the file is honored below.
    let config = Config::from_env().context("Invalid configuration")?;
    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    let store = open_store(config).await?;

    match cli.command {
        Commands::Upload {
            files,
            content_type,
            folder,
            public,
            tags,
            parallel,
        } => {
            let mut batch = Vec::with_capacity(files.len());
            for path in &files {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                batch.push(BulkFile {
                    data: Bytes::from(data),
                    metadata: upload_metadata(
                        path,
                        content_type.as_deref(),
                        folder,
                        public,
                        &tags,
                    ),
                });
            }

            if batch.len() == 1 {
                let file = batch.remove(0);
                let outcome = store.upload(file.data, file.metadata).await?;
                print_json(&serde_json::json!({
                    "duplicate": outcome.is_duplicate(),
                    "file": outcome.record(),
                }))?;
            } else {
                let mode = if parallel {
                    BulkMode::Parallel
                } else {
                    BulkMode::Sequential
                };
                let result = store
                    .upload_many(
                        batch,
                        BulkOptions {
                            mode,
                            concurrency: None,
                        },
                    )
                    .await;
                let succeeded: Vec<_> = result
                    .succeeded
                    .iter()
                    .map(|o| {
                        serde_json::json!({ "duplicate": o.is_duplicate(), "file": o.record() })
                    })
                    .collect();
                let failed: Vec<_> = result
                    .failed
                    .iter()
                    .map(|f| {
                        serde_json::json!({ "index": f.index, "name": f.name, "error": f.error })
                    })
                    .collect();
                print_json(&serde_json::json!({ "succeeded": succeeded, "failed": failed }))?;
            }
        }
        Commands::UploadUrl { url, name } => {
            let mut metadata = UploadMetadata::default();
            if let Some(name) = name {
                metadata.original_name = name;
            }
            let outcome = store.upload_from_url(&url, metadata).await?;
            print_json(&serde_json::json!({
                "duplicate": outcome.is_duplicate(),
                "file": outcome.record(),
            }))?;
        }
        Commands::Get { id } => {
            let record = store.get(id).await?;
            let urls = store.urls(id).await?;
            print_json(&serde_json::json!({ "file": record, "urls": urls }))?;
        }
        Commands::Find { path, digest } => {
            let digest = match (path, digest) {
                (_, Some(hex)) => ContentDigest::from_hex(&hex)?,
                (Some(path), None) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    ContentHasher::digest_reader(file).await?.0
                }
                (None, None) => anyhow::bail!("Pass a file or --digest"),
            };
            let found = store.find_by_digest(&digest).await?;
            print_json(&serde_json::json!({ "digest": digest, "file": found }))?;
        }
        Commands::Verify { id } => {
            let intact = store.verify_integrity(id).await?;
            print_json(&serde_json::json!({ "id": id, "intact": intact }))?;
            if !intact {
                return Ok(EXIT_DAMAGED);
            }
        }
        Commands::Delete { id } => {
            let deleted = store.delete(id, None).await?;
            print_json(&serde_json::json!({ "id": id, "deleted": deleted }))?;
        }
    }

    Ok(EXIT_OK)
}
