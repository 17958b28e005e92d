use fnostar_warehouse::{PipelineConfig, Warehouse};
use serde_json::Value;

use crate::cli::LoadArgs;
use crate::error::CliError;

pub fn run(warehouse: &Warehouse, args: &LoadArgs) -> Result<Value, CliError> {
    let config = PipelineConfig::new(&args.file, args.exchange.as_str())
        .with_batch_size(args.batch_size)
        .with_fact_chunk_rows(args.fact_chunk_rows)
        .with_from_start(args.from_start);

    let report = warehouse.ingest(&config)?;
    Ok(serde_json::to_value(report)?)
}
