//! Command-line interface for the geoindex benchmarks.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod run;

pub use error::CliError;

use run::RunArgs;

const ARG_DATASET: &str = "dataset";
const ARG_GEOMETRY: &str = "geometry";
const ARG_DISTANCE_QUERIES: &str = "distance-queries";
const ARG_RANGE_QUERIES: &str = "range-queries";
const ARG_BACKEND: &str = "backend";
const ARG_PREFIX: &str = "prefix";
const ARG_CRS: &str = "crs";
const ARG_ENCODING: &str = "encoding";
const ARG_TRANSLATE_LAT: &str = "translate-lat";
const ARG_TRANSLATE_LON: &str = "translate-lon";
const ARG_REPORT_DIR: &str = "report-dir";
const ARG_TIME_BUDGET_SECS: &str = "time-budget-secs";
const ENV_DATASET: &str = "GEOINDEX_CMDS_RUN_DATASET";
const ENV_GEOMETRY: &str = "GEOINDEX_CMDS_RUN_GEOMETRY";
const ENV_DISTANCE_QUERIES: &str = "GEOINDEX_CMDS_RUN_DISTANCE_QUERIES";
const ENV_RANGE_QUERIES: &str = "GEOINDEX_CMDS_RUN_RANGE_QUERIES";

/// Run the geoindex CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Run(args) => run::run_command(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "geoindex",
    about = "Benchmark harness for spatial index implementations",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build each selected index over a dataset and time its queries.
    Run(RunArgs),
}

#[cfg(test)]
mod tests;
