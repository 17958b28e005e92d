//! CLI argument definitions for fnostar.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `load` | Load an F&O trade file into the star schema |
//! | `exchange add` | Register an exchange |
//! | `exchange list` | List registered exchanges |
//! | `status` | Table counts and per-file load progress |
//!
//! # Global Options
//!
//! | Option | Env | Description |
//! |--------|-----|-------------|
//! | `--db` | `FNOSTAR_DB` | Warehouse file (default `$FNOSTAR_HOME/warehouse.duckdb`) |
//! | `--memory-limit` | `FNOSTAR_MEMORY_LIMIT` | DuckDB memory limit, e.g. `4GB` |
//! | `--pretty` | | Pretty-print JSON output |
//! | `-v` | `RUST_LOG` | Raise log verbosity (repeatable) |
//!
//! # Examples
//!
//! ```bash
//! fnostar exchange add NSE
//! fnostar load fo02JAN2024bhav.csv --exchange NSE --batch-size 100000
//! fnostar status --pretty
//! ```

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use fnostar_warehouse::{DEFAULT_BATCH_SIZE, DEFAULT_FACT_CHUNK_ROWS};

/// Load NSE F&O bhavcopy files into a DuckDB star schema.
#[derive(Debug, Parser)]
#[command(
    name = "fnostar",
    author,
    version,
    about = "Load F&O trade files into a DuckDB star schema",
    long_about = "fnostar reads futures-and-options bhavcopy files in bounded batches and loads \
them into instrument and contract dimensions plus a trade fact table.\n\
\n\
Each batch commits atomically together with a per-file watermark, so an interrupted \
load resumes after the last committed batch.\n\
\n\
Use 'fnostar <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Path to the warehouse database file.
    #[arg(long, global = true, env = "FNOSTAR_DB")]
    pub db: Option<PathBuf>,

    /// DuckDB memory limit (for example `4GB`). Unset keeps the engine default.
    #[arg(long, global = true, env = "FNOSTAR_MEMORY_LIMIT")]
    pub memory_limit: Option<String>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a trade file batch by batch.
    ///
    /// A file that was partially loaded before resumes after its last
    /// committed batch; a fully loaded file is skipped.
    ///
    /// # Examples
    ///
    ///   fnostar load fo02JAN2024bhav.csv
    ///   fnostar load fo02JAN2024bhav.csv --batch-size 50000 --from-start
    Load(LoadArgs),

    /// Manage exchange master data.
    Exchange(ExchangeArgs),

    /// Show table row counts and load progress per file.
    Status,
}

/// Arguments for the `load` command.
#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Trade file to load.
    pub file: PathBuf,

    /// Registered exchange the file belongs to.
    #[arg(long, env = "FNOSTAR_EXCHANGE", default_value = "NSE")]
    pub exchange: String,

    /// Maximum rows held in memory and committed per transaction.
    #[arg(long, env = "FNOSTAR_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Maximum rows per fact INSERT statement.
    #[arg(long, default_value_t = DEFAULT_FACT_CHUNK_ROWS)]
    pub fact_chunk_rows: usize,

    /// Ignore the file's watermark and reload from the first row.
    #[arg(long, default_value_t = false)]
    pub from_start: bool,
}

/// Arguments for the `exchange` command group.
#[derive(Debug, Args)]
pub struct ExchangeArgs {
    #[command(subcommand)]
    pub command: ExchangeCommand,
}

#[derive(Debug, Subcommand)]
pub enum ExchangeCommand {
    /// Register an exchange. Registering an existing name is a no-op.
    Add(ExchangeAddArgs),

    /// List registered exchanges.
    List,
}

#[derive(Debug, Args)]
pub struct ExchangeAddArgs {
    /// Exchange name, e.g. NSE.
    pub name: String,
}
