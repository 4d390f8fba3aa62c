//! # Plan RAG CLI (`prag`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `prag init` | Create the SQLite database and run schema migrations |
//! | `prag scrape <url>` | Crawl from a seed URL and ingest new plans |
//! | `prag query "<text>" --method choose\|generate` | Answer a request |
//! | `prag add <file>` | Index documents from a JSON file |
//! | `prag donate <file>` | Donate a plan from a JSON file |
//! | `prag export <file>` | Render a plan JSON file to PDF |
//! | `prag serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use plan_rag::{add, config, donate, export, ingest, logging, migrate, query, server};

/// Plan RAG: crawl, enrich, and query tabular training plans.
#[derive(Parser)]
#[command(name = "prag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/prag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Crawl from a seed URL and ingest plans not seen before.
    Scrape {
        /// Seed URL (http or https).
        url: String,
    },

    /// Answer a request from the stored plans.
    Query {
        /// Free-text request.
        content: String,

        /// `choose` returns a stored plan; `generate` writes a new one.
        #[arg(long, default_value = "choose")]
        method: String,

        /// Metadata equality filter, `key=value`. Repeatable.
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Index documents from a JSON file, bypassing the crawler.
    Add {
        file: PathBuf,
    },

    /// Donate a plan from a JSON file.
    Donate {
        file: PathBuf,
    },

    /// Render a plan JSON file to PDF in `export.dir`.
    Export {
        file: PathBuf,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Scrape { url } => {
            ingest::run_scrape(&cfg, &url).await?;
        }
        Commands::Query {
            content,
            method,
            filters,
        } => {
            query::run_query(&cfg, &content, &method, &filters).await?;
        }
        Commands::Add { file } => {
            add::run_add(&cfg, &file).await?;
        }
        Commands::Donate { file } => {
            donate::run_donate(&cfg, &file).await?;
        }
        Commands::Export { file } => {
            export::run_export(&cfg, &file).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
