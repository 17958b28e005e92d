//! # fnostar warehouse
//!
//! DuckDB star schema for end-of-day F&O trade data.
//!
//! ## Overview
//!
//! Trade rows are normalized into two dimensions (`instrument`, `contract`),
//! scoped to an exchange row in `reference_entity`, and an append-only
//! `trade_fact` table that references both by surrogate key.
//!
//! Loading is batch-atomic: each source batch runs its instrument, contract and
//! fact work inside one transaction together with the watermark that records
//! how far the file has been committed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fnostar_warehouse::{PipelineConfig, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     warehouse.register_exchange("NSE")?;
//!
//!     let config = PipelineConfig::new("fo_bhavcopy.csv", "NSE").with_batch_size(100_000);
//!     let report = warehouse.ingest(&config)?;
//!
//!     println!("committed {} batches", report.batches_committed);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `reference_entity` | Exchanges (externally governed master data) |
//! | `instrument` | Symbol and instrument type per exchange |
//! | `contract` | Expiry, strike and option type per instrument |
//! | `trade_fact` | Daily trade observations |
//! | `ingest_watermark` | Committed progress per source file |
//! | `ingest_log` | One audit row per committed batch |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_trades` | Facts joined to their dimensions |
//! | `vw_instrument_activity` | Daily activity per instrument |

pub mod dimensions;
pub mod duckdb;
pub mod facts;
pub mod ingest;
pub mod keys;
pub mod migrations;
pub mod reference;
mod sql;
pub mod views;
pub mod watermark;

use std::env;
use std::fs;
use std::path::PathBuf;

use ::duckdb::Connection;
use fnostar_core::SourceError;
use serde::Serialize;
use thiserror::Error;

pub use dimensions::{load_contracts, load_instruments, DimensionLoad};
pub use facts::{load_facts, TradeFact};
pub use ingest::{
    ingest_batch, run_pipeline, BatchContext, BatchOutcome, KeyMaps, PipelineConfig, RunFailure,
    RunReport, DEFAULT_BATCH_SIZE, DEFAULT_FACT_CHUNK_ROWS,
};
pub use keys::{ContractId, ContractKey, ContractMap, ExchangeId, InstrumentId, InstrumentMap, KeyMap};
pub use reference::Exchange;
pub use watermark::{Watermark, WatermarkRecord};

/// Errors raised while loading the star schema.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Required configuration or master data is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source file could not be read or contains a malformed row.
    #[error(transparent)]
    Parse(#[from] SourceError),

    /// A natural key could not be resolved to a surrogate key.
    #[error("referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    /// The store rejected a statement (constraint, I/O, connectivity).
    #[error("store operation failed: {0}")]
    BulkLoad(#[from] ::duckdb::Error),

    /// The source file changed since its watermark was written.
    #[error(
        "source '{source_path}' has a watermark for a file with fingerprint {expected}, \
         but the file now has fingerprint {found}; reload it from the start"
    )]
    WatermarkMismatch {
        source_path: String,
        expected: String,
        found: String,
    },

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// `DuckDB` memory limit such as `"4GB"`; `None` keeps the engine default.
    pub memory_limit: Option<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: resolve_fnostar_home().join("warehouse.duckdb"),
            memory_limit: None,
        }
    }
}

/// Row count of one warehouse table.
#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: u64,
}

/// Snapshot of the warehouse contents and ingestion progress.
#[derive(Debug, Clone, Serialize)]
pub struct WarehouseStatus {
    pub db_path: PathBuf,
    pub schema_version: Option<String>,
    pub tables: Vec<TableCount>,
    pub watermarks: Vec<WatermarkRecord>,
}

const STATUS_TABLES: [&str; 5] = [
    "reference_entity",
    "instrument",
    "contract",
    "trade_fact",
    "ingest_log",
];

/// The star-schema warehouse, holding one read-write session.
pub struct Warehouse {
    config: WarehouseConfig,
    connection: Connection,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let connection = duckdb::open_connection(&config)?;
        let warehouse = Self { config, connection };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending migrations and (re)create views.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        migrations::apply_migrations(&self.connection)?;
        views::create_views(&self.connection)?;
        Ok(())
    }

    /// The session every pipeline operation runs on.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Register an exchange. Registering an existing name is a no-op.
    pub fn register_exchange(&self, name: &str) -> Result<Exchange, WarehouseError> {
        reference::register_exchange(&self.connection, name)
    }

    pub fn exchanges(&self) -> Result<Vec<Exchange>, WarehouseError> {
        reference::list_exchanges(&self.connection)
    }

    /// Load a source file into the star schema.
    pub fn ingest(&self, config: &PipelineConfig) -> Result<RunReport, RunFailure> {
        run_pipeline(&self.connection, config)
    }

    pub fn status(&self) -> Result<WarehouseStatus, WarehouseError> {
        let mut tables = Vec::with_capacity(STATUS_TABLES.len());
        for table in STATUS_TABLES {
            // Table names come from the fixed list above.
            let sql = format!("SELECT COUNT(*) FROM {table}");
            let rows: i64 = self.connection.query_row(sql.as_str(), [], |row| row.get(0))?;
            tables.push(TableCount {
                table,
                rows: u64::try_from(rows).unwrap_or_default(),
            });
        }

        Ok(WarehouseStatus {
            db_path: self.config.db_path.clone(),
            schema_version: migrations::current_version(&self.connection)?,
            tables,
            watermarks: watermark::list(&self.connection)?,
        })
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
pub(crate) fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the fnostar home directory from environment or default.
fn resolve_fnostar_home() -> PathBuf {
    if let Some(path) = env::var_os("FNOSTAR_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".fnostar");
    }

    PathBuf::from(".fnostar")
}


#[cfg(test)]
mod tests {
    use super::test_support::open_temp;
    use super::*;

    #[test]
    fn initializes_star_schema_tables_and_views() {
        let (_temp, warehouse) = open_temp();

        let tables: i64 = warehouse
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_name IN ('reference_entity', 'instrument', 'contract', 'trade_fact', \
                 'ingest_watermark', 'ingest_log', 'vw_trades', 'vw_instrument_activity')",
                [],
                |row| row.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 8);
    }

    #[test]
    fn reopening_an_existing_warehouse_keeps_its_data() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = WarehouseConfig {
            db_path: temp.path().join("nested").join("warehouse.duckdb"),
            memory_limit: Some(String::from("256MB")),
        };

        {
            let warehouse = Warehouse::open(config.clone()).expect("first open");
            warehouse.register_exchange("NSE").expect("register");
        }

        let warehouse = Warehouse::open(config).expect("second open");
        let exchanges = warehouse.exchanges().expect("list");
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].name, "NSE");
    }

    #[test]
    fn status_reports_counts_for_every_table() {
        let (_temp, warehouse) = open_temp();
        warehouse.register_exchange("NSE").expect("register");

        let status = warehouse.status().expect("status");

        assert_eq!(status.tables.len(), STATUS_TABLES.len());
        let exchanges = status
            .tables
            .iter()
            .find(|count| count.table == "reference_entity")
            .expect("reference_entity count");
        assert_eq!(exchanges.rows, 1);
        assert!(status.schema_version.is_some());
        assert!(status.watermarks.is_empty());
    }

    #[test]
    fn failed_transactions_are_rolled_back() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();

        connection.execute_batch("BEGIN TRANSACTION").expect("begin");
        let result = (|| -> Result<(), WarehouseError> {
            connection.execute(
                "INSERT INTO reference_entity (name) VALUES (?)",
                ::duckdb::params!["BSE"],
            )?;
            Err(WarehouseError::Configuration(String::from("forced")))
        })();
        let error = finalize_transaction(connection, result).expect_err("must fail");

        assert!(matches!(error, WarehouseError::Configuration(_)));
        assert!(warehouse.exchanges().expect("list").is_empty());
    }
}
