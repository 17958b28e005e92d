//! Batch transaction coordinator and the run pipeline built on it.
//!
//! A run resolves the exchange, checks the source watermark, preloads the key
//! maps and then commits the source one batch at a time. Each batch is atomic;
//! the run is not. A failure leaves every earlier batch committed together with
//! a watermark describing exactly those batches, so the next run resumes after
//! them.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use ::duckdb::{params, Connection};
use fnostar_core::{Batch, BatchReader, SourceError, SourceFingerprint};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dimensions::{load_contracts, load_instruments};
use crate::facts::load_facts;
use crate::keys::{ContractMap, ExchangeId, InstrumentMap};
use crate::reference::resolve_exchange;
use crate::watermark::{self, Watermark};
use crate::{finalize_transaction, WarehouseError};

pub const DEFAULT_BATCH_SIZE: usize = 200_000;
pub const DEFAULT_FACT_CHUNK_ROWS: usize = 1_000;

/// Parameters of one load run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub input_path: PathBuf,
    /// Name of a registered exchange.
    pub exchange: String,
    /// Upper bound on rows held in memory at once.
    pub batch_size: usize,
    /// Upper bound on rows per fact `INSERT` statement.
    pub fact_chunk_rows: usize,
    /// Ignore any watermark and reload from the first row.
    pub from_start: bool,
}

impl PipelineConfig {
    pub fn new(input_path: impl Into<PathBuf>, exchange: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            exchange: exchange.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            fact_chunk_rows: DEFAULT_FACT_CHUNK_ROWS,
            from_start: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_fact_chunk_rows(mut self, fact_chunk_rows: usize) -> Self {
        self.fact_chunk_rows = fact_chunk_rows;
        self
    }

    pub fn with_from_start(mut self, from_start: bool) -> Self {
        self.from_start = from_start;
        self
    }

    /// # Errors
    /// Returns [`WarehouseError::Configuration`] for a zero size or a blank exchange.
    pub fn validate(&self) -> Result<(), WarehouseError> {
        if self.batch_size == 0 {
            return Err(WarehouseError::Configuration(String::from(
                "batch size must be greater than zero",
            )));
        }
        if self.fact_chunk_rows == 0 {
            return Err(WarehouseError::Configuration(String::from(
                "fact chunk size must be greater than zero",
            )));
        }
        if self.exchange.trim().is_empty() {
            return Err(WarehouseError::Configuration(String::from(
                "exchange name must not be blank",
            )));
        }
        Ok(())
    }
}

/// The instrument and contract maps of one exchange.
#[derive(Debug, Clone, Default)]
pub struct KeyMaps {
    pub instruments: InstrumentMap,
    pub contracts: ContractMap,
}

impl KeyMaps {
    pub fn preload(connection: &Connection, exchange_id: ExchangeId) -> Result<Self, WarehouseError> {
        Ok(Self {
            instruments: InstrumentMap::preload_instruments(connection, exchange_id)?,
            contracts: ContractMap::preload_contracts(connection, exchange_id)?,
        })
    }

    pub fn commit_staged(&mut self) {
        self.instruments.commit_staged();
        self.contracts.commit_staged();
    }

    pub fn discard_staged(&mut self) {
        self.instruments.discard_staged();
        self.contracts.discard_staged();
    }
}

/// Run-level state a batch transaction needs besides the rows themselves.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    pub run_id: &'a str,
    pub source_path: &'a str,
    pub fingerprint: &'a str,
    pub exchange_id: ExchangeId,
    pub fact_chunk_rows: usize,
    /// Watermark position before this batch.
    pub batches_committed: u64,
    pub rows_committed: u64,
}

/// Counts of one committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub batch_index: u64,
    pub rows: u64,
    pub instruments_inserted: u64,
    pub contracts_inserted: u64,
    pub facts_inserted: u64,
    pub latency_ms: u64,
}

/// Load one batch atomically.
///
/// Instruments, contracts, facts, the advanced watermark and the ingest log
/// row are written in a single transaction. On success the key maps' staged
/// entries are promoted; on failure the transaction is rolled back and the
/// staged entries are dropped.
///
/// # Errors
/// Returns the first error raised inside the transaction.
pub fn ingest_batch(
    connection: &Connection,
    batch: &Batch,
    context: &BatchContext<'_>,
    maps: &mut KeyMaps,
) -> Result<BatchOutcome, WarehouseError> {
    let started = Instant::now();

    connection.execute_batch("BEGIN TRANSACTION")?;
    let result = (|| -> Result<BatchOutcome, WarehouseError> {
        let instruments =
            load_instruments(connection, batch, context.exchange_id, &mut maps.instruments)?;
        let contracts = load_contracts(connection, batch, &maps.instruments, &mut maps.contracts)?;
        let facts = load_facts(
            connection,
            batch,
            &maps.instruments,
            &maps.contracts,
            context.fact_chunk_rows,
        )?;

        let rows = batch.len() as u64;
        watermark::save(
            connection,
            &Watermark {
                source_path: context.source_path.to_owned(),
                fingerprint: context.fingerprint.to_owned(),
                exchange_id: context.exchange_id,
                batches_committed: context.batches_committed + 1,
                rows_committed: context.rows_committed + rows,
                completed: false,
            },
        )?;

        let outcome = BatchOutcome {
            batch_index: batch.index,
            rows,
            instruments_inserted: instruments.inserted as u64,
            contracts_inserted: contracts.inserted as u64,
            facts_inserted: facts as u64,
            latency_ms: elapsed_ms(started),
        };
        append_log(connection, context, &outcome)?;
        Ok(outcome)
    })();

    match finalize_transaction(connection, result) {
        Ok(outcome) => {
            maps.commit_staged();
            Ok(outcome)
        }
        Err(error) => {
            maps.discard_staged();
            warn!(
                batch = batch.index,
                first_line = batch.first_line,
                %error,
                "batch rolled back"
            );
            Err(error)
        }
    }
}

fn append_log(
    connection: &Connection,
    context: &BatchContext<'_>,
    outcome: &BatchOutcome,
) -> Result<(), WarehouseError> {
    connection.execute(
        r"
INSERT INTO ingest_log (
    run_id, source_path, batch_index, row_count, instruments_inserted,
    contracts_inserted, facts_inserted, latency_ms, committed_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
",
        params![
            context.run_id,
            context.source_path,
            outcome.batch_index,
            outcome.rows,
            outcome.instruments_inserted,
            outcome.contracts_inserted,
            outcome.facts_inserted,
            outcome.latency_ms,
        ],
    )?;
    Ok(())
}

/// Summary of a load run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub exchange: String,
    pub source_path: String,
    pub batch_size: usize,
    /// Batches committed by this run.
    pub batches_committed: u64,
    /// Rows committed by this run.
    pub rows_committed: u64,
    /// Rows skipped because an earlier run already committed them.
    pub rows_skipped: u64,
    pub resumed_from_row: Option<u64>,
    pub instruments_inserted: u64,
    pub contracts_inserted: u64,
    pub facts_inserted: u64,
    /// The source had already been loaded completely; nothing was done.
    pub already_completed: bool,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            exchange: config.exchange.trim().to_owned(),
            source_path: config.input_path.display().to_string(),
            batch_size: config.batch_size,
            batches_committed: 0,
            rows_committed: 0,
            rows_skipped: 0,
            resumed_from_row: None,
            instruments_inserted: 0,
            contracts_inserted: 0,
            facts_inserted: 0,
            already_completed: false,
            elapsed_ms: 0,
        }
    }

    fn record(&mut self, outcome: &BatchOutcome) {
        self.batches_committed += 1;
        self.rows_committed += outcome.rows;
        self.instruments_inserted += outcome.instruments_inserted;
        self.contracts_inserted += outcome.contracts_inserted;
        self.facts_inserted += outcome.facts_inserted;
    }
}

/// A run that stopped on an error, with what it committed before stopping.
#[derive(Debug, Error)]
#[error("load stopped after {} committed batch(es): {error}", .report.batches_committed)]
pub struct RunFailure {
    pub report: Box<RunReport>,
    #[source]
    pub error: WarehouseError,
}

/// Load a source file batch by batch.
///
/// # Errors
/// Returns a [`RunFailure`] carrying the partial report if configuration,
/// watermark checks or any batch fail.
pub fn run_pipeline(connection: &Connection, config: &PipelineConfig) -> Result<RunReport, RunFailure> {
    let started = Instant::now();
    let mut report = RunReport::new(config);

    let result = drive(connection, config, &mut report);
    report.elapsed_ms = elapsed_ms(started);

    match result {
        Ok(()) => Ok(report),
        Err(error) => Err(RunFailure {
            report: Box::new(report),
            error,
        }),
    }
}

/// Where a run starts in its source.
struct StartPosition {
    batches: u64,
    rows: u64,
}

fn drive(
    connection: &Connection,
    config: &PipelineConfig,
    report: &mut RunReport,
) -> Result<(), WarehouseError> {
    config.validate()?;
    let exchange_id = resolve_exchange(connection, config.exchange.as_str())?;

    let path = fs::canonicalize(&config.input_path).map_err(|source| SourceError::Open {
        path: config.input_path.display().to_string(),
        source,
    })?;
    let source_path = path.display().to_string();
    report.source_path.clone_from(&source_path);
    let fingerprint = SourceFingerprint::of(&path)?.to_string();

    let Some(start) = start_position(connection, config, &source_path, &fingerprint, exchange_id)?
    else {
        info!(source = %source_path, "source already loaded completely");
        report.already_completed = true;
        return Ok(());
    };

    let mut reader = BatchReader::open(&path, config.batch_size)?;
    if start.rows > 0 {
        let skipped = reader.resume(start.rows, start.batches)?;
        if skipped < start.rows {
            return Err(WarehouseError::Configuration(format!(
                "watermark of '{source_path}' records {} committed rows but the file has {skipped}; \
                 reload it with --from-start",
                start.rows
            )));
        }
        warn!(
            source = %source_path,
            rows = skipped,
            batches = start.batches,
            "resuming after rows committed by an earlier run"
        );
        report.rows_skipped = skipped;
        report.resumed_from_row = Some(skipped);
    }

    let mut maps = KeyMaps::preload(connection, exchange_id)?;
    debug!(
        instruments = maps.instruments.len(),
        contracts = maps.contracts.len(),
        "preloaded key maps"
    );

    let run_id = report.run_id.clone();
    let mut batches_committed = start.batches;
    let mut rows_committed = start.rows;
    for batch in reader {
        let batch = batch?;
        let context = BatchContext {
            run_id: run_id.as_str(),
            source_path: source_path.as_str(),
            fingerprint: fingerprint.as_str(),
            exchange_id,
            fact_chunk_rows: config.fact_chunk_rows,
            batches_committed,
            rows_committed,
        };
        let outcome = ingest_batch(connection, &batch, &context, &mut maps)?;

        batches_committed += 1;
        rows_committed += outcome.rows;
        report.record(&outcome);
        info!(
            batch = outcome.batch_index,
            rows = outcome.rows,
            instruments = outcome.instruments_inserted,
            contracts = outcome.contracts_inserted,
            facts = outcome.facts_inserted,
            latency_ms = outcome.latency_ms,
            "committed batch"
        );
    }

    watermark::mark_completed(connection, source_path.as_str())?;
    info!(
        source = %source_path,
        batches = report.batches_committed,
        rows = report.rows_committed,
        "load complete"
    );
    Ok(())
}

/// Decide where to start from the stored watermark, or `None` if the source
/// is already fully loaded.
fn start_position(
    connection: &Connection,
    config: &PipelineConfig,
    source_path: &str,
    fingerprint: &str,
    exchange_id: ExchangeId,
) -> Result<Option<StartPosition>, WarehouseError> {
    let fresh = Watermark::start(source_path, fingerprint, exchange_id);

    match watermark::load(connection, source_path)? {
        Some(previous) if config.from_start => {
            warn!(
                source = %source_path,
                batches = previous.batches_committed,
                "discarding watermark and reloading from the first row"
            );
        }
        Some(previous) if previous.fingerprint != fingerprint => {
            return Err(WarehouseError::WatermarkMismatch {
                source_path: source_path.to_owned(),
                expected: previous.fingerprint,
                found: fingerprint.to_owned(),
            });
        }
        Some(previous) if previous.exchange_id != exchange_id => {
            return Err(WarehouseError::Configuration(format!(
                "'{source_path}' was loaded for exchange id {}; reload it with --from-start",
                previous.exchange_id
            )));
        }
        Some(previous) if previous.completed => return Ok(None),
        Some(previous) => {
            return Ok(Some(StartPosition {
                batches: previous.batches_committed,
                rows: previous.rows_committed,
            }));
        }
        None => {}
    }

    watermark::save(connection, &fresh)?;
    Ok(Some(StartPosition { batches: 0, rows: 0 }))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
