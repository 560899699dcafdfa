//! Strata CLI
//!
//! Command-line interface for executing schema descriptors against SQLite

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata_core::logging_facility;
use strata_store::StoreConfig;

mod commands;

/// Database file used when neither a config file nor `--db` names one
const DEFAULT_DATABASE: &str = "strata.db";

#[derive(Debug, Parser)]
#[command(name = "strata")]
#[command(about = "Strata - schema execution and catalog inspection", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file; takes precedence over the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Schema descriptor operations
    Schema(commands::schema::SchemaArgs),
    /// Object catalog operations
    Catalog(commands::catalog::CatalogArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::from_env(),
    };
    match cli.db {
        Some(db) => config.database.path = db,
        None if cli.config.is_none() && config.database.is_in_memory() => {
            config.database.path = PathBuf::from(DEFAULT_DATABASE);
        }
        None => {}
    }
    logging_facility::init(config.logging.profile);

    match cli.command {
        Commands::Schema(args) => commands::schema::execute(args, &config),
        Commands::Catalog(args) => commands::catalog::execute(args, &config),
    }
}
