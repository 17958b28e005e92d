//! Batched reader over a delimited F&O trade file.
//!
//! The reader is a lazy, finite iterator: each call to `next` pulls at most
//! `batch_size` rows off the underlying CSV stream, normalizes them, and hands
//! back an owned [`Batch`]. Nothing before the current batch is retained, so
//! peak memory is bounded by the batch size regardless of file size.
//!
//! The iterator cannot be rewound. Starting over means opening the file again;
//! resuming after committed work goes through [`BatchReader::resume`].

use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use csv::{Position, StringRecord};
use serde::Deserialize;

use crate::domain::{parse_source_date, OptionType, StrikePrice, TradeMeasures, TradeRow};
use crate::{SourceError, ValidationError};

/// Header columns a source file must carry. Extra columns are ignored.
pub const REQUIRED_COLUMNS: [&str; 15] = [
    "SYMBOL",
    "INSTRUMENT",
    "EXPIRY_DT",
    "STRIKE_PR",
    "OPTION_TYP",
    "OPEN",
    "HIGH",
    "LOW",
    "CLOSE",
    "SETTLE_PR",
    "CONTRACTS",
    "VAL_INLAKH",
    "OPEN_INT",
    "CHG_IN_OI",
    "TIMESTAMP",
];

// Caps the up-front allocation for very large batch sizes.
const PREALLOCATE_LIMIT: usize = 65_536;

/// A bounded slice of source rows processed as one unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 0-based position of the batch in the file.
    pub index: u64,
    /// Source line of the first row in the batch.
    pub first_line: u64,
    pub rows: Vec<TradeRow>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct RawTradeRecord<'a> {
    symbol: &'a str,
    instrument: &'a str,
    expiry_dt: &'a str,
    strike_pr: &'a str,
    option_typ: &'a str,
    open: &'a str,
    high: &'a str,
    low: &'a str,
    close: &'a str,
    settle_pr: &'a str,
    contracts: &'a str,
    val_inlakh: &'a str,
    open_int: &'a str,
    chg_in_oi: &'a str,
    timestamp: &'a str,
}

impl RawTradeRecord<'_> {
    fn normalize(&self, line: u64) -> Result<TradeRow, ValidationError> {
        Ok(TradeRow {
            line,
            symbol: non_blank("SYMBOL", self.symbol)?,
            instrument_type: non_blank("INSTRUMENT", self.instrument)?,
            expiry_date: parse_source_date("EXPIRY_DT", self.expiry_dt)?,
            strike_price: StrikePrice::parse(self.strike_pr)?,
            option_type: OptionType::normalize(self.option_typ),
            trade_date: parse_source_date("TIMESTAMP", self.timestamp)?,
            measures: TradeMeasures {
                open: parse_price("OPEN", self.open)?,
                high: parse_price("HIGH", self.high)?,
                low: parse_price("LOW", self.low)?,
                close: parse_price("CLOSE", self.close)?,
                settle_price: parse_price("SETTLE_PR", self.settle_pr)?,
                contracts_traded: parse_count("CONTRACTS", self.contracts)?,
                value_in_lakh: parse_price("VAL_INLAKH", self.val_inlakh)?,
                open_interest: parse_count("OPEN_INT", self.open_int)?,
                change_in_oi: parse_count("CHG_IN_OI", self.chg_in_oi)?,
            },
        })
    }
}

/// Lazy iterator of [`Batch`]es over a CSV source.
#[derive(Debug)]
pub struct BatchReader<R> {
    reader: csv::Reader<R>,
    headers: StringRecord,
    record: StringRecord,
    batch_size: usize,
    next_index: u64,
    rows_read: u64,
    exhausted: bool,
}

impl BatchReader<File> {
    /// Open `path` and validate its header row.
    ///
    /// # Errors
    /// Returns an error if the batch size is zero, the file cannot be opened,
    /// or a required column is missing.
    pub fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(file, batch_size)
    }
}

impl<R: Read> BatchReader<R> {
    pub fn from_reader(input: R, batch_size: usize) -> Result<Self, SourceError> {
        if batch_size == 0 {
            return Err(SourceError::InvalidBatchSize);
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);
        let headers = reader.headers()?.clone();

        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|header| header == column) {
                return Err(SourceError::MissingColumn { column });
            }
        }

        Ok(Self {
            reader,
            headers,
            record: StringRecord::new(),
            batch_size,
            next_index: 0,
            rows_read: 0,
            exhausted: false,
        })
    }

    /// Skip rows already committed by an earlier run.
    ///
    /// Skipped rows are not normalized. Returns how many rows were actually
    /// skipped, which is less than `rows` only when the file is shorter.
    pub fn resume(&mut self, rows: u64, batches: u64) -> Result<u64, SourceError> {
        let mut skipped = 0;
        while skipped < rows && self.reader.read_record(&mut self.record)? {
            skipped += 1;
        }
        self.rows_read += skipped;
        self.next_index = batches;
        Ok(skipped)
    }

    /// Rows consumed so far, including rows skipped by `resume`.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn read_row(&mut self) -> Result<Option<TradeRow>, SourceError> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }

        let line = self.record.position().map_or(0, Position::line);
        let raw: RawTradeRecord<'_> = self
            .record
            .deserialize(Some(&self.headers))
            .map_err(|error| SourceError::parse(line, error))?;
        let row = raw
            .normalize(line)
            .map_err(|error| SourceError::parse(line, error))?;
        Ok(Some(row))
    }
}

impl<R: Read> Iterator for BatchReader<R> {
    type Item = Result<Batch, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let mut rows = Vec::with_capacity(self.batch_size.min(PREALLOCATE_LIMIT));
        while rows.len() < self.batch_size {
            match self.read_row() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {
                    self.exhausted = true;
                    break;
                }
                Err(error) => {
                    self.exhausted = true;
                    return Some(Err(error));
                }
            }
        }

        let first_line = rows.first()?.line;
        let batch = Batch {
            index: self.next_index,
            first_line,
            rows,
        };
        self.next_index += 1;
        self.rows_read += batch.rows.len() as u64;
        Some(Ok(batch))
    }
}

/// Identity of a source file based on its size and modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFingerprint {
    len: u64,
    modified_nanos: u128,
}

impl SourceFingerprint {
    pub fn of(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let metadata = fs::metadata(path.as_ref())?;
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let modified_nanos = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Ok(Self {
            len: metadata.len(),
            modified_nanos,
        })
    }

    pub fn from_parts(len: u64, modified: SystemTime) -> Self {
        Self {
            len,
            modified_nanos: modified
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
        }
    }
}

impl Display for SourceFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}-{:x}", self.len, self.modified_nanos)
    }
}

fn non_blank(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField { field });
    }
    Ok(trimmed.to_owned())
}

fn parse_price(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField { field });
    }
    let value = trimmed
        .parse::<f64>()
        .map_err(|_| ValidationError::InvalidNumber {
            field,
            value: trimmed.to_owned(),
        })?;
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(value)
}

// Some exports write integral counts as `500.0`.
fn parse_count(field: &'static str, raw: &str) -> Result<i64, ValidationError> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }

    let value = parse_price(field, trimmed)?;
    if value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(ValidationError::InvalidNumber {
            field,
            value: trimmed.to_owned(),
        });
    }
    Ok(value as i64)
}
