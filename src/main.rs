//! # Workflow RAG CLI (`wfr`)
//!
//! ## Usage
//!
//! ```bash
//! wfr --config ./config/wfr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wfr init` | Create the SQLite database and run schema migrations |
//! | `wfr serve` | Start the HTTP server |
//! | `wfr ingest <collection> <files...>` | Index local files into a knowledge base |
//! | `wfr run --pipeline <file> "<query>"` | Execute a pipeline definition |
//! | `wfr collections list` | List knowledge bases |
//! | `wfr collections files <name>` | List files in a knowledge base |
//! | `wfr collections delete <name>` | Delete a knowledge base |
//! | `wfr collections delete-file <name> <file>` | Delete one file and its chunks |
//! | `wfr reset` | Delete every knowledge base and upload |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use workflow_rag::app::App;
use workflow_rag::chat::ChatRequest;
use workflow_rag::config::{self, Config};
use workflow_rag::ingest::{FileStatus, Upload};
use workflow_rag::{migrate, server};

/// Workflow RAG: linear retrieval-augmented generation pipelines over
/// document knowledge bases.
#[derive(Parser)]
#[command(name = "wfr", version)]
struct Cli {
    /// Path to configuration file (TOML). Missing sections use defaults.
    #[arg(long, global = true, default_value = "./config/wfr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Extract, chunk and embed local files into a knowledge base.
    Ingest {
        /// Knowledge base name; created if missing.
        collection: String,
        /// Files to index.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Execute a pipeline definition against a query.
    Run {
        /// JSON file holding the array of pipeline steps.
        #[arg(long)]
        pipeline: PathBuf,
        /// Workflow UUID used to label the response.
        #[arg(long)]
        workflow: Option<String>,
        /// The user query.
        query: String,
    },

    /// Inspect and delete knowledge bases.
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Delete every knowledge base, file record and upload.
    Reset {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List knowledge bases with their chunk counts.
    List,
    /// List the files indexed into a knowledge base.
    Files { name: String },
    /// Delete a knowledge base and its uploads.
    Delete { name: String },
    /// Delete one file and all of its chunks.
    DeleteFile { name: String, file: String },
}

/// Load the config file, falling back to defaults when it does not exist.
fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "Config file not found; using defaults");
        config::parse_config("")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            server::serve(&cfg).await?;
        }
        Commands::Ingest { collection, files } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                uploads.push(Upload::new(filename, bytes));
            }

            let app = App::open(&cfg).await?;
            let report = app.knowledge.ingest(&collection, uploads).await?;
            for file in &report.files {
                match file.status {
                    FileStatus::Indexed => println!("  indexed  {} ({} chunks)", file.filename, file.chunks),
                    FileStatus::Skipped | FileStatus::Failed => println!(
                        "  {:<8} {} ({})",
                        format!("{:?}", file.status).to_lowercase(),
                        file.filename,
                        file.detail.as_deref().unwrap_or("")
                    ),
                }
            }
            for rebuilt in &report.rebuilt_collections {
                println!("  rebuilt collection {} for the current embedding model", rebuilt);
            }
            println!("{}", report.message);
        }
        Commands::Run {
            pipeline,
            workflow,
            query,
        } => {
            let raw = tokio::fs::read_to_string(&pipeline)
                .await
                .with_context(|| format!("reading {}", pipeline.display()))?;
            let steps: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", pipeline.display()))?;

            let app = App::open(&cfg).await?;
            let request = ChatRequest {
                workflow_id: workflow.unwrap_or_else(|| uuid::Uuid::nil().to_string()),
                query,
                pipeline: steps,
            };
            let response = app.chat.chat(request).await?;
            println!("{}", response.response);
            if !response.rebuilt_collections.is_empty() {
                eprintln!("rebuilt: {}", response.rebuilt_collections.join(", "));
            }
        }
        Commands::Collections { action } => {
            let app = App::open(&cfg).await?;
            match action {
                CollectionAction::List => {
                    let collections = app.knowledge.list_collections().await?;
                    if collections.is_empty() {
                        println!("No collections.");
                    }
                    for c in collections {
                        println!("{:<32} {:>8} chunks  dims={}", c.name, c.count, c.dims);
                    }
                }
                CollectionAction::Files { name } => {
                    let files = app.knowledge.list_files(&name).await?;
                    if files.is_empty() {
                        println!("No files in {}.", name);
                    }
                    for f in files {
                        println!(
                            "{:<40} {:>10} bytes  {}",
                            f.id,
                            f.size.map(|s| s.to_string()).unwrap_or_else(|| "?".into()),
                            f.uploaded_at.as_deref().unwrap_or("")
                        );
                    }
                }
                CollectionAction::Delete { name } => {
                    app.knowledge.delete_collection(&name).await?;
                    println!("Deleted collection {}", name);
                }
                CollectionAction::DeleteFile { name, file } => {
                    let deleted = app.knowledge.delete_file(&name, &file).await?;
                    println!(
                        "Deleted {} from {} ({} chunks)",
                        deleted.filename, deleted.collection_name, deleted.removed_chunks
                    );
                }
            }
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes every knowledge base and upload; pass --yes to confirm");
            }
            let app = App::open(&cfg).await?;
            app.knowledge.reset_all().await?;
            println!("All knowledge bases deleted.");
        }
    }

    Ok(())
}
