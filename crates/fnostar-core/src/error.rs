use thiserror::Error;

/// Field-level validation errors raised while normalizing a source row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{field}' cannot be blank")]
    BlankField { field: &'static str },

    #[error("field '{field}' is not a valid date: '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },

    #[error("strike price must be non-negative: '{value}'")]
    NegativeStrike { value: String },

    #[error("epoch day {days} is outside the supported calendar range")]
    EpochDayOutOfRange { days: i64 },
}

/// Errors produced by the batched source reader.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open source '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("source is missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("malformed row at line {line}: {message}")]
    Parse { line: u64, message: String },

    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
}

impl SourceError {
    pub(crate) fn parse(line: u64, error: impl std::fmt::Display) -> Self {
        Self::Parse {
            line,
            message: error.to_string(),
        }
    }
}
