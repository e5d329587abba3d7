//! Warehouse populator binary.
//!
//! `populate` (the default) loads the configuration and merges every configured table
//! snapshot into the warehouse once. `transform` reshapes the CSV extracts of the ingestion
//! bucket into those snapshots. Both print the per-table result as a JSON object and exit with
//! a failure status when any table failed.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use etl_config::Environment;
use etl_telemetry::tracing::init_tracing;
use etl_warehouse::report::RunReport;
use tracing::error;

use crate::config::load_populator_config;
use crate::core::{start_populator_with_config, start_transform_with_config};

mod config;
mod core;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge the processed snapshots into the warehouse.
    Populate {
        /// Populate only these tables, overriding the configured list.
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },
    /// Reshape the ingested extracts into one processed snapshot per table.
    Transform,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let environment = Environment::load()?;
    init_tracing(env!("CARGO_BIN_NAME"), environment)?;

    let mut config = load_populator_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match args.command.unwrap_or(Command::Populate { tables: None }) {
        Command::Populate { tables } => {
            if let Some(tables) = tables {
                config.tables = Some(tables);
                config.validate(&etl_warehouse::registry::table_names())?;
            }

            finish(runtime.block_on(start_populator_with_config(config))?)
        }
        Command::Transform => finish(runtime.block_on(start_transform_with_config(config))?),
    }
}

/// Prints `report` as JSON and maps failed tables to a failure status.
fn finish<T>(report: RunReport<T>) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string(&report)?);

    if let Err(err) = report.into_result() {
        error!("{err}");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
