//! Core contracts for fnostar.
//!
//! This crate contains:
//! - Canonical domain types for F&O trade rows and their natural keys
//! - Field normalization (dates, strikes, option types)
//! - The batched, memory-bounded source reader

pub mod domain;
pub mod error;
pub mod source;

pub use domain::{
    from_epoch_day, parse_source_date, InstrumentKey, OptionType,
    StrikePrice, TradeMeasures, TradeRow,
};
pub use error::{SourceError, ValidationError};
pub use source::{Batch, BatchReader, SourceFingerprint, REQUIRED_COLUMNS};
