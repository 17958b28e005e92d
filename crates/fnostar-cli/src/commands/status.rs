use fnostar_warehouse::Warehouse;
use serde_json::Value;

use crate::error::CliError;

pub fn run(warehouse: &Warehouse) -> Result<Value, CliError> {
    Ok(serde_json::to_value(warehouse.status()?)?)
}
