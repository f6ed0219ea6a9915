//! # DevKB CLI (`devkb`)
//!
//! ```bash
//! devkb --config ./config/devkb.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `devkb init` | Create the SQLite database and schema |
//! | `devkb add <file>` | Add or update a single file |
//! | `devkb index <dir>` | Index every supported file under a directory |
//! | `devkb search "<query>"` | Hybrid search (`--keyword-only` for keyword search) |
//! | `devkb get <id>` | Print a document with its snippets |
//! | `devkb delete <id>` | Delete a document |
//! | `devkb stats` | Database statistics |
//! | `devkb embed pending` | Backfill missing or stale embeddings |
//! | `devkb embed rebuild` | Delete and regenerate all embeddings |
//! | `devkb serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use devkb::config::{self, Config};
use devkb::{embed_cmd, get, ingest, migrate, search, server, stats};

/// DevKB: a local developer knowledge base with hybrid search and LLM chat.
///
/// All commands accept `--config`. When the file does not exist, built-in
/// defaults are used.
#[derive(Parser)]
#[command(name = "devkb", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/devkb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema. Safe to run repeatedly.
    Init,

    /// Add a single file to the knowledge base.
    Add {
        file: PathBuf,

        /// Override the detected title.
        #[arg(long)]
        title: Option<String>,
    },

    /// Index every supported file under a directory.
    Index {
        dir: PathBuf,

        /// Only index the top-level directory.
        #[arg(long)]
        no_recursive: bool,

        /// Extensions to include (repeatable), e.g. `--ext md --ext py`.
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },

    /// Search the knowledge base.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<i64>,

        /// Only return documents in this category.
        #[arg(long)]
        category: Option<String>,

        /// Skip vector retrieval.
        #[arg(long)]
        keyword_only: bool,
    },

    /// Print a document by id.
    Get { id: String },

    /// Delete a document by id.
    Delete { id: String },

    /// Show database statistics.
    Stats,

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed snippets without a current vector.
    Pending {
        /// Maximum number of snippets to embed.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete all vectors and embed every snippet again.
    Rebuild,
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,devkb=info")),
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
        Commands::Add { file, title } => {
            ingest::run_add(&cfg, &file, title).await?;
        }
        Commands::Index {
            dir,
            no_recursive,
            extensions,
        } => {
            ingest::run_index(&cfg, &dir, !no_recursive, extensions).await?;
        }
        Commands::Search {
            query,
            limit,
            category,
            keyword_only,
        } => {
            search::run_search(&cfg, &query, limit, category, keyword_only).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => {
                embed_cmd::run_embed_pending(&cfg, limit).await?;
            }
            EmbedAction::Rebuild => {
                embed_cmd::run_embed_rebuild(&cfg).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
