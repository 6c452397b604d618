use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use propmerge_core::{ConsolidationOutcome, ProposalId, consolidate};
use propmerge_store::{DuckStore, TableLayout};
use tracing::info;

mod report;

#[derive(Parser)]
#[command(
    name = "propmerge",
    version,
    about = "Consolidate overlapping commission-split proposals"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consolidate a JSON proposal snapshot.
    Consolidate {
        /// JSON array of proposals.
        #[arg(long)]
        input: PathBuf,
        /// Where to write the outcome (retained proposals and audit trail).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Consolidate the proposal table of a DuckDB database and persist the outcome.
    Db {
        #[arg(long, env = "PROPMERGE_DATABASE")]
        database: PathBuf,
        /// Schema holding the proposal table and its child tables.
        #[arg(long, env = "PROPMERGE_SCHEMA", default_value = "main")]
        schema: String,
        /// Schema receiving the retained proposals and their child rows.
        #[arg(long, env = "PROPMERGE_STAGING_SCHEMA", default_value = "staging")]
        staging_schema: String,
        /// JSON file overriding table and column names.
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Also write the outcome as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Consolidate and report without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show whether a proposal was retained or consumed, and why.
    Explain {
        /// Outcome file written by `consolidate --output` or `db --output`.
        #[arg(long)]
        outcome: PathBuf,
        id: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("propmerge v{}", env!("CARGO_PKG_VERSION"));

    match Cli::parse().command {
        Command::Consolidate { input, output } => {
            let proposals = propmerge_store::read_snapshot(&input)
                .with_context(|| format!("reading snapshot {}", input.display()))?;
            let outcome = consolidate(proposals).context("consolidation self-check failed")?;
            finish(&outcome, output.as_deref())
        }
        Command::Db {
            database,
            schema,
            staging_schema,
            layout,
            output,
            dry_run,
        } => {
            let layout = match layout {
                Some(path) => TableLayout::from_file(&path)
                    .with_context(|| format!("reading layout {}", path.display()))?,
                None => TableLayout::default(),
            };
            let mut store = DuckStore::open_persistent(&database)
                .with_context(|| format!("opening {}", database.display()))?;
            let proposals = store
                .load_proposals(&schema, &layout)
                .context("loading proposals")?;
            let outcome = consolidate(proposals).context("consolidation self-check failed")?;

            if dry_run {
                info!("dry run, database left untouched");
            } else {
                let summary = store
                    .apply_outcome(&schema, &staging_schema, &layout, &outcome)
                    .context("persisting outcome")?;
                for (table, rows) in &summary.staged_children {
                    info!(table = %table, rows, "child rows staged");
                }
            }
            finish(&outcome, output.as_deref())
        }
        Command::Explain { outcome, id } => {
            let outcome = propmerge_store::read_outcome(&outcome)
                .with_context(|| format!("reading outcome {}", outcome.display()))?;
            report::print_explanation(&outcome, &ProposalId::from(id))
        }
    }
}

fn finish(outcome: &ConsolidationOutcome, output: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = output {
        propmerge_store::write_outcome(path, outcome)
            .with_context(|| format!("writing outcome {}", path.display()))?;
    }
    report::print_outcome_card(outcome)
}
