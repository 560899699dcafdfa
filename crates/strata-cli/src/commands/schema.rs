//! Schema commands
//!
//! Usage: strata schema <execute|drop|render|verify> <DESCRIPTOR>

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use strata_core::dialect::helper_for;
use strata_core::errors::ExError;
use strata_core::model::Action;
use strata_core::schema::SchemaDefinition;
use strata_store::{Database, ExecuteReport, Schema, StoreConfig};

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    /// Create, alter or drop every object as its action asks
    Execute(DescriptorArgs),
    /// Drop the schema's objects, dependants first
    Drop(DropArgs),
    /// Print the create statements without touching a database
    Render(RenderArgs),
    /// Compare the descriptor with the catalog and the database
    Verify(DescriptorArgs),
}

#[derive(Debug, Args)]
pub struct DescriptorArgs {
    /// Schema descriptor (YAML, or JSON with a .json extension)
    pub descriptor: PathBuf,
}

#[derive(Debug, Args)]
pub struct DropArgs {
    /// Schema descriptor (YAML, or JSON with a .json extension)
    pub descriptor: PathBuf,

    /// Drop only this object and the objects depending on it
    #[arg(long)]
    pub object: Option<String>,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Schema descriptor (YAML, or JSON with a .json extension)
    pub descriptor: PathBuf,

    /// sqlite, postgres or mysql
    #[arg(long, default_value = "sqlite")]
    pub dialect: String,
}

pub fn execute(args: SchemaArgs, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        SchemaCommand::Execute(args) => execute_schema(&args.descriptor, config),
        SchemaCommand::Drop(args) => execute_drop(args, config),
        SchemaCommand::Render(args) => execute_render(args),
        SchemaCommand::Verify(args) => execute_verify(&args.descriptor, config),
    }
}

fn load_schema(descriptor: &Path) -> Result<Schema, Box<dyn std::error::Error>> {
    let definition = SchemaDefinition::from_path(descriptor).map_err(ExError::from)?;
    let schema = Schema::from_definition(&definition)?;
    tracing::debug!(
        descriptor = %descriptor.display(),
        schema_id = schema.id(),
        objects = schema.graph().len() as u64,
        "descriptor loaded"
    );
    Ok(schema)
}

fn execute_schema(descriptor: &Path, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut schema = load_schema(descriptor)?;
    let mut db = Database::connect(&config.database)?;

    let report = schema.execute(&mut db)?;
    print_report(&report);
    db.disconnect()?;

    if !report.failed.is_empty() {
        return Err(format!("{} object(s) failed", report.failed.len()).into());
    }
    Ok(())
}

fn execute_drop(args: DropArgs, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut schema = load_schema(&args.descriptor)?;
    let mut db = Database::connect(&config.database)?;

    let report = match &args.object {
        Some(name) => schema.drop_object(&mut db, name)?,
        None => schema.drop(&mut db)?,
    };
    print_report(&report);
    db.disconnect()?;

    if !report.failed.is_empty() {
        return Err(format!("{} object(s) failed", report.failed.len()).into());
    }
    Ok(())
}

fn execute_render(args: RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let helper =
        helper_for(&args.dialect).ok_or_else(|| format!("Unknown dialect: {}", args.dialect))?;
    let schema = load_schema(&args.descriptor)?;

    let mut statements = Vec::new();
    for name in schema.graph().topological_order().map_err(ExError::from)? {
        let object = match schema.object(&name) {
            Some(object) if object.action() != Action::Drop => object,
            _ => continue,
        };
        let sql = object
            .with_alterations_applied()
            .create_sql(helper.as_ref())
            .map_err(ExError::from)?;
        statements.push(sql);
    }

    for sql in statements {
        println!("{};\n", sql);
    }
    Ok(())
}

fn execute_verify(descriptor: &Path, config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let schema = load_schema(descriptor)?;
    let db = Database::connect(&config.database)?;

    let issues = schema.verify(&db)?;
    db.disconnect()?;

    if issues.is_empty() {
        println!("{}: up to date", schema.id());
        return Ok(());
    }
    for issue in &issues {
        println!("{}", issue);
    }
    Err(format!("{} object(s) out of date", issues.len()).into())
}

fn print_report(report: &ExecuteReport) {
    let sections = [
        ("created", &report.created),
        ("adopted", &report.adopted),
        ("altered", &report.altered),
        ("dropped", &report.dropped),
        ("skipped", &report.skipped),
        ("failed", &report.failed),
    ];
    for (label, names) in sections {
        if !names.is_empty() {
            println!("{}: {}", label, names.join(", "));
        }
    }
    println!("ddl statements: {}", report.ddl_statements);
}
