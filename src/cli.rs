//! Command-line interface definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::collector::CollectorOptions;
use crate::diff::DiffMode;
use crate::retry::RetryPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "schemascribe",
    version,
    about = "Database schema export and diff tool"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump the schema as a dependency-ordered, executable SQL script
    Dump(DumpArgs),
    /// Export the schema as a structured JSON document
    Export(ExportArgs),
    /// Compare the schemas of two sources (database files or saved .sql scripts)
    Diff(DiffArgs),
}

/// Filters applied while collecting a snapshot
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Collect only this table (repeatable)
    #[arg(long = "table", value_name = "NAME")]
    pub tables: Vec<String>,

    /// Skip this table (repeatable)
    #[arg(long = "exclude-table", value_name = "NAME")]
    pub exclude_tables: Vec<String>,

    /// Include engine-internal objects (names starting with sqlite_)
    #[arg(long)]
    pub system: bool,

    /// Additional attempts per metadata call before giving up
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub retries: u32,
}

impl FilterArgs {
    pub fn to_options(&self) -> CollectorOptions {
        CollectorOptions {
            include_system: self.system,
            include_tables: self.tables.clone(),
            exclude_tables: self.exclude_tables.clone(),
            retry: RetryPolicy {
                retries: self.retries,
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Path to the SQLite database
    pub database: PathBuf,

    /// Write the script here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Path to the SQLite database
    pub database: PathBuf,

    /// Write the document here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// First source: a database file, or a .sql script saved earlier
    pub source_a: PathBuf,

    /// Second source: a database file, or a .sql script saved earlier
    pub source_b: PathBuf,

    /// Output shape of the delta
    #[arg(long, value_enum, default_value_t = DiffModeArg::Unified)]
    pub mode: DiffModeArg,

    /// Label for the first source (defaults to its path)
    #[arg(long, value_name = "LABEL")]
    pub label_a: Option<String>,

    /// Label for the second source (defaults to its path)
    #[arg(long, value_name = "LABEL")]
    pub label_b: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DiffModeArg {
    Unified,
    Migration,
}

impl From<DiffModeArg> for DiffMode {
    fn from(mode: DiffModeArg) -> Self {
        match mode {
            DiffModeArg::Unified => DiffMode::Unified,
            DiffModeArg::Migration => DiffMode::Migration,
        }
    }
}
