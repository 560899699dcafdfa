//! Catalog commands
//!
//! Usage: strata catalog list [--schema <ID>]

use clap::{Args, Subcommand};
use strata_store::{catalog, Database, StoreConfig};

#[derive(Debug, Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommand,
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// List registered objects
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only objects registered by this schema
    #[arg(long)]
    pub schema: Option<String>,
}

pub fn execute(args: CatalogArgs, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        CatalogCommand::List(list_args) => execute_list(list_args, config),
    }
}

fn execute_list(args: ListArgs, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::connect(&config.database)?;
    catalog::ensure_tables(db.connection())?;
    let entries = catalog::list(db.connection(), args.schema.as_deref())?;
    db.disconnect()?;

    if entries.is_empty() {
        println!("No registered objects");
        return Ok(());
    }
    for entry in entries {
        let object = entry.object;
        println!(
            "{}\t{}\t{}\t{}\t{}",
            object.name,
            object.kind.as_str(),
            entry.schema_id,
            object.unique_id,
            object.created_at.to_rfc3339()
        );
    }
    Ok(())
}
