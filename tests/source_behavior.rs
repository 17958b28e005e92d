//! Behavior-driven tests for reading F&O trade files
//!
//! These tests verify HOW the batch reader turns a bhavcopy file into bounded,
//! normalized batches, focusing on what the loader downstream relies on.

use fnostar_core::{BatchReader, SourceError, SourceFingerprint, StrikePrice};
use std::fs;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};
use time::macros::date;

const HEADER: &str = "INSTRUMENT,SYMBOL,EXPIRY_DT,STRIKE_PR,OPTION_TYP,OPEN,HIGH,LOW,CLOSE,SETTLE_PR,CONTRACTS,VAL_INLAKH,OPEN_INT,CHG_IN_OI,TIMESTAMP,";

fn write_source(rows: &[&str]) -> (TempDir, PathBuf) {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("fo02JAN2024bhav.csv");
    let mut contents = format!("{HEADER}\n");
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    fs::write(&path, contents).expect("write source");
    (temp, path)
}

fn futures_row(symbol: &str) -> String {
    format!("FUTIDX,{symbol},25-Jan-2024,0,XX,21700,21800,21650,21750,21745.5,1200,26000.5,9800000,12000,02-JAN-2024,")
}

// =============================================================================
// Source Reader: Batching
// =============================================================================

#[test]
fn when_file_exceeds_batch_size_rows_arrive_in_bounded_batches() {
    // Given: A file with seven rows
    let rows: Vec<String> = (0..7).map(|n| futures_row(&format!("SYM{n}"))).collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let (_temp, path) = write_source(&refs);

    // When: The file is read with a batch size of three
    let batches: Vec<_> = BatchReader::open(&path, 3)
        .expect("open")
        .collect::<Result<_, _>>()
        .expect("read");

    // Then: Batches hold 3, 3 and 1 rows in file order
    let sizes: Vec<usize> = batches.iter().map(|batch| batch.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(batches[1].index, 1);
    assert_eq!(batches[1].first_line, 5, "header is line 1");
    assert_eq!(batches[2].rows[0].symbol, "SYM6");
}

#[test]
fn when_resuming_committed_rows_are_skipped_and_numbering_continues() {
    // Given: A five-row file whose first four rows were committed in two batches
    let rows: Vec<String> = (0..5).map(|n| futures_row(&format!("SYM{n}"))).collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let (_temp, path) = write_source(&refs);
    let mut reader = BatchReader::open(&path, 2).expect("open");

    // When: The reader resumes after them
    let skipped = reader.resume(4, 2).expect("resume");
    let remaining: Vec<_> = reader.collect::<Result<_, _>>().expect("read");

    // Then: Only the last row is produced, as batch 2
    assert_eq!(skipped, 4);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].index, 2);
    assert_eq!(remaining[0].rows[0].symbol, "SYM4");
}

// =============================================================================
// Source Reader: Normalization
// =============================================================================

#[test]
fn when_row_uses_nse_formats_fields_are_normalized() {
    // Given: Option and futures rows in NSE's native formats
    let (_temp, path) = write_source(&[
        "OPTSTK,RELIANCE,25-jan-2024,2450.5,ce,30,32,29,31,31.2,800,5000,12000,-400,02-JAN-2024,",
        "FUTSTK,RELIANCE,2024-01-25,,   ,2500,2510,2490,2505,2504,300.0,7500,1000,0,2024-01-02T00:00:00,",
    ]);

    // When: The file is read
    let batch = BatchReader::open(&path, 10)
        .expect("open")
        .next()
        .expect("one batch")
        .expect("valid batch");

    // Then: Dates, strikes and counts are normalized; option types are only trimmed
    let option = &batch.rows[0];
    assert_eq!(option.expiry_date, date!(2024 - 01 - 25));
    assert_eq!(option.strike_price, Some(StrikePrice::from_hundredths(245_050)));
    assert_eq!(option.option_type.as_ref().map(|kind| kind.as_str()), Some("ce"));
    assert_eq!(option.measures.change_in_oi, -400);

    let future = &batch.rows[1];
    assert_eq!(future.trade_date, date!(2024 - 01 - 02));
    assert_eq!(future.strike_price, None);
    assert_eq!(future.option_type, None, "blank option type must become None");
    assert_eq!(future.measures.contracts_traded, 300);
}

// =============================================================================
// Source Reader: Failures
// =============================================================================

#[test]
fn when_row_is_malformed_the_error_names_its_line_and_reading_stops() {
    // Given: A file whose third line has an unparseable expiry date
    let good = futures_row("NIFTY");
    let (_temp, path) = write_source(&[
        good.as_str(),
        "FUTIDX,BANKNIFTY,31-Foo-2024,0,XX,1,1,1,1,1,1,1,1,1,02-JAN-2024,",
        good.as_str(),
    ]);

    // When: The file is read one row per batch
    let mut reader = BatchReader::open(&path, 1).expect("open");
    let first = reader.next().expect("first batch");
    let second = reader.next().expect("second item");

    // Then: The first row loads, the second fails with its line, and iteration ends
    assert!(first.is_ok());
    match second {
        Err(SourceError::Parse { line, message }) => {
            assert_eq!(line, 3);
            assert!(message.contains("EXPIRY_DT"), "{message}");
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    assert!(reader.next().is_none());
}

#[test]
fn when_required_column_is_missing_no_batch_is_produced() {
    // Given: A file carrying only three of the required columns
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("partial.csv");
    fs::write(&path, "INSTRUMENT,SYMBOL,EXPIRY_DT\nFUTIDX,NIFTY,25-Jan-2024\n").expect("write");

    // When: The file is opened
    let error = BatchReader::open(&path, 10).expect_err("must fail");

    // Then: The missing column is named
    assert!(matches!(error, SourceError::MissingColumn { column } if column == "STRIKE_PR"));
}

#[test]
fn when_file_does_not_exist_an_open_error_names_it() {
    let error = BatchReader::open("/definitely/not/here.csv", 10).expect_err("must fail");
    assert!(error.to_string().contains("/definitely/not/here.csv"));
}

// =============================================================================
// Source Fingerprint
// =============================================================================

#[test]
fn when_file_changes_its_fingerprint_changes() {
    // Given: A fingerprinted file
    let (_temp, path) = write_source(&[futures_row("NIFTY").as_str()]);
    let before = SourceFingerprint::of(&path).expect("fingerprint");

    // When: A row is appended
    let mut contents = fs::read_to_string(&path).expect("read");
    contents.push_str(&futures_row("BANKNIFTY"));
    contents.push('\n');
    fs::write(&path, contents).expect("rewrite");

    // Then: Size alone is enough to tell the versions apart
    assert_ne!(SourceFingerprint::of(&path).expect("fingerprint"), before);
}
