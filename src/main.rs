//! schemascribe — database schema export and diff tool
//!
//! Extracts the structural schema of a SQLite database (tables, columns,
//! constraints, indexes, views, triggers) and re-renders it as either an
//! executable, dependency-ordered SQL script or a structured JSON document,
//! and compares two schema sources as a normalized line diff.
//!
//! Pipeline: collector → snapshot → { graph → synthesizer } → script, and
//! independently snapshot → structured formatter → document. The diff
//! command renders (or reads) two scripts and hands them to the diff engine.

mod cli;
mod collector;
mod diff;
mod error;
mod graph;
mod retry;
mod snapshot;
mod structured;
mod synthesize;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command, DiffArgs, DumpArgs, ExportArgs, FilterArgs};
use collector::SqliteCollector;
use diff::{DiffEngine, DiffOutcome};
use snapshot::SchemaSnapshot;
use structured::StructuredFormatter;
use synthesize::SqlSynthesizer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Dump(args) => run_dump(args).await,
        Command::Export(args) => run_export(args).await,
        Command::Diff(args) => run_diff(args).await,
    }
}

/// Initialize tracing with env-filter overridable structured logging
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "schemascribe=debug"
    } else {
        "schemascribe=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

async fn collect_snapshot(database: &Path, filter: &FilterArgs) -> Result<SchemaSnapshot> {
    let collector = SqliteCollector::open(database, filter.to_options()).await?;
    let snapshot = collector.collect().await?;
    info!(
        "captured schema from {}: {} tables, {} views, {} triggers",
        snapshot.metadata.source,
        snapshot.tables.len(),
        snapshot.views.len(),
        snapshot.triggers.len()
    );
    Ok(snapshot)
}

async fn run_dump(args: DumpArgs) -> Result<()> {
    let snapshot = collect_snapshot(&args.database, &args.filter).await?;
    let script = SqlSynthesizer::render(&snapshot)?;
    write_output(args.output.as_deref(), &script)
}

async fn run_export(args: ExportArgs) -> Result<()> {
    let snapshot = collect_snapshot(&args.database, &args.filter).await?;
    let document = StructuredFormatter::render(&snapshot)?;
    write_output(args.output.as_deref(), &document)
}

async fn run_diff(args: DiffArgs) -> Result<()> {
    let text_a = load_diff_source(&args.source_a, &args.filter).await?;
    let text_b = load_diff_source(&args.source_b, &args.filter).await?;
    let label_a = args
        .label_a
        .unwrap_or_else(|| args.source_a.display().to_string());
    let label_b = args
        .label_b
        .unwrap_or_else(|| args.source_b.display().to_string());

    match DiffEngine::compare(&text_a, &text_b, &label_a, &label_b, args.mode.into()) {
        DiffOutcome::Identical => {
            println!("No schema differences between {label_a} and {label_b}.");
        }
        DiffOutcome::Patch(patch) => print!("{patch}"),
    }
    Ok(())
}

/// A diff source is either a saved script (`.sql`) read verbatim, or a
/// database file collected and rendered on the spot.
async fn load_diff_source(path: &Path, filter: &FilterArgs) -> Result<String> {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
    {
        Ok(std::fs::read_to_string(path)?)
    } else {
        let snapshot = collect_snapshot(path, filter).await?;
        Ok(SqlSynthesizer::render(&snapshot)?)
    }
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            info!("✅ wrote {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
