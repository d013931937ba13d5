//! # Catalog Harness CLI (`catalog`)
//!
//! The `catalog` binary loads a product feed into a local SQLite-backed
//! catalog and answers category, pagination and search queries over it.
//!
//! ## Usage
//!
//! ```bash
//! catalog --config ./config/catalog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catalog init` | Create the SQLite database and run schema migrations |
//! | `catalog ingest` | Replace the catalog with the contents of a feed |
//! | `catalog tree` | Print the category tree with subtree product counts |
//! | `catalog products <id>` | One page of products under a category |
//! | `catalog search "<query>"` | Ranked product search by article and name |
//! | `catalog stats` | Snapshot summary and catalog statistics |
//!
//! Set `RUST_LOG=info` (or `debug`) to see ingestion logs on stderr.

use catalog_harness::{config, ingest, migrate, products, progress, search, stats, tree};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog Harness CLI: a local-first product catalog engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/catalog.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "catalog",
    about = "Catalog Harness: ingest a product feed, browse categories, search products",
    version,
    long_about = "Catalog Harness streams a YML-style XML product feed into a local SQLite \
    catalog, rebuilds the category hierarchy, counts products per category subtree without \
    double counting, and answers paginated category listings and product searches."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/catalog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest a feed, replacing the published catalog.
    ///
    /// The previous catalog stays in place if the feed cannot be fetched
    /// or parsed.
    Ingest {
        /// Feed path or `http(s)://` URL. Defaults to `[feed].source`.
        #[arg(long)]
        feed: Option<String>,

        /// Progress output: `auto`, `human`, `json`, or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Print the category tree with product counts.
    Tree {
        /// Print JSON instead of an indented tree.
        #[arg(long)]
        json: bool,
    },

    /// List products under a category and all its descendants.
    Products {
        /// Category id.
        category_id: i64,

        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Page size. Defaults to `[query].default_per_page`.
        #[arg(long)]
        per_page: Option<i64>,
    },

    /// Search products by article and name.
    Search {
        /// The search query string.
        query: String,

        /// Print JSON instead of a ranked list.
        #[arg(long)]
        json: bool,
    },

    /// Show catalog statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            feed,
            progress: flag,
        } => {
            let mode = progress::ProgressMode::from_flag(&flag).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid --progress value '{}'. Use auto, human, json, or off.",
                    flag
                )
            })?;
            ingest::run_ingest(&cfg, feed, mode).await?;
        }
        Commands::Tree { json } => {
            tree::run_tree(&cfg, json).await?;
        }
        Commands::Products {
            category_id,
            page,
            per_page,
        } => {
            products::run_products(&cfg, category_id, page, per_page).await?;
        }
        Commands::Search { query, json } => {
            search::run_search(&cfg, &query, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
