use fnostar_warehouse::{RunFailure, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Load(#[from] RunFailure),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Warehouse(error) => warehouse_exit_code(error),
            Self::Load(failure) => warehouse_exit_code(&failure.error),
            Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}

const fn warehouse_exit_code(error: &WarehouseError) -> i32 {
    match error {
        WarehouseError::Configuration(_) => 2,
        WarehouseError::Parse(_) => 3,
        WarehouseError::ReferentialIntegrity(_) => 4,
        WarehouseError::BulkLoad(_) => 5,
        WarehouseError::WatermarkMismatch { .. } => 6,
        WarehouseError::Io(_) => 10,
    }
}
