//! Persisted ingestion progress per source file.
//!
//! The watermark row of a source is written in the same transaction as the
//! batch it accounts for, so after a crash it never claims more (or less) than
//! what the store holds.

use ::duckdb::{params, Connection, OptionalExt, Row};
use serde::Serialize;

use crate::keys::ExchangeId;
use crate::WarehouseError;

/// Committed progress of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Watermark {
    pub source_path: String,
    /// Size/mtime identity of the file the progress refers to.
    pub fingerprint: String,
    pub exchange_id: ExchangeId,
    pub batches_committed: u64,
    pub rows_committed: u64,
    pub completed: bool,
}

impl Watermark {
    /// A watermark for a file nothing has been committed from yet.
    pub fn start(
        source_path: impl Into<String>,
        fingerprint: impl Into<String>,
        exchange_id: ExchangeId,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            fingerprint: fingerprint.into(),
            exchange_id,
            batches_committed: 0,
            rows_committed: 0,
            completed: false,
        }
    }
}

/// A stored watermark with its last update time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatermarkRecord {
    #[serde(flatten)]
    pub watermark: Watermark,
    pub updated_at: String,
}

const SELECT_COLUMNS: &str = "source_path, fingerprint, reference_id, batches_committed, \
     rows_committed, completed, CAST(updated_at AS VARCHAR)";

pub fn load(connection: &Connection, source_path: &str) -> Result<Option<Watermark>, WarehouseError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM ingest_watermark WHERE source_path = ?");
    let record = connection
        .query_row(sql.as_str(), params![source_path], read_record)
        .optional()?;
    Ok(record.map(|record| record.watermark))
}

/// Insert or overwrite the watermark of its source path.
pub fn save(connection: &Connection, watermark: &Watermark) -> Result<(), WarehouseError> {
    connection.execute(
        r"
INSERT OR REPLACE INTO ingest_watermark (
    source_path, fingerprint, reference_id, batches_committed, rows_committed, completed, updated_at
) VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
",
        params![
            watermark.source_path,
            watermark.fingerprint,
            watermark.exchange_id,
            watermark.batches_committed,
            watermark.rows_committed,
            watermark.completed,
        ],
    )?;
    Ok(())
}

pub fn mark_completed(connection: &Connection, source_path: &str) -> Result<(), WarehouseError> {
    connection.execute(
        "UPDATE ingest_watermark SET completed = TRUE, updated_at = CURRENT_TIMESTAMP WHERE source_path = ?",
        params![source_path],
    )?;
    Ok(())
}

pub fn list(connection: &Connection) -> Result<Vec<WatermarkRecord>, WarehouseError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM ingest_watermark ORDER BY source_path");
    let mut statement = connection.prepare(sql.as_str())?;
    let rows = statement.query_map([], read_record)?;

    let mut records = Vec::new();
    for record in rows {
        records.push(record?);
    }
    Ok(records)
}

fn read_record(row: &Row<'_>) -> Result<WatermarkRecord, ::duckdb::Error> {
    let batches: i64 = row.get(3)?;
    let rows: i64 = row.get(4)?;
    Ok(WatermarkRecord {
        watermark: Watermark {
            source_path: row.get(0)?,
            fingerprint: row.get(1)?,
            exchange_id: ExchangeId::new(row.get(2)?),
            batches_committed: u64::try_from(batches).unwrap_or_default(),
            rows_committed: u64::try_from(rows).unwrap_or_default(),
            completed: row.get(5)?,
        },
        updated_at: row.get(6)?,
    })
}
