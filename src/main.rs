//! # Movies ETL CLI (`movies-etl`)
//!
//! ## Usage
//!
//! ```bash
//! movies-etl --config ./config/etl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `movies-etl init` | Wait for Elasticsearch and create the index if missing |
//! | `movies-etl run` | Run the incremental pipeline until Ctrl-C |
//! | `movies-etl run --once` | Run a single tick and print a per-table summary |
//! | `movies-etl state` | Print the persisted watermark of every tracked table |
//! | `movies-etl check` | Report reachability of PostgreSQL and Elasticsearch |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use movies_etl::{config, health, logging, run, state};

/// Movies ETL: incremental sync of the movies catalog into Elasticsearch.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/etl.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "movies-etl", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/etl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the search index with its mapping.
    ///
    /// Blocks until Elasticsearch answers, then creates the index unless it
    /// already exists. Safe to run repeatedly.
    Init,

    /// Run the pipeline.
    ///
    /// Every tick processes the configured tables in order, starting from
    /// each table's persisted watermark.
    Run {
        /// Run a single tick, print a summary and exit.
        #[arg(long)]
        once: bool,
    },

    /// Print the persisted watermark of every tracked table.
    State,

    /// Check that PostgreSQL and Elasticsearch are reachable.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => run::run_init(&cfg).await?,
        Commands::Run { once } => run::run_etl(&cfg, once).await?,
        Commands::State => state::run_state(&cfg).await?,
        Commands::Check => health::run_check(&cfg).await?,
    }

    Ok(())
}
