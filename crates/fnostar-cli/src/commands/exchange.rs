use fnostar_warehouse::Warehouse;
use serde_json::Value;

use crate::cli::{ExchangeArgs, ExchangeCommand};
use crate::error::CliError;

pub fn run(warehouse: &Warehouse, args: &ExchangeArgs) -> Result<Value, CliError> {
    match &args.command {
        ExchangeCommand::Add(add) => {
            let exchange = warehouse.register_exchange(add.name.as_str())?;
            Ok(serde_json::to_value(exchange)?)
        }
        ExchangeCommand::List => Ok(serde_json::to_value(warehouse.exchanges()?)?),
    }
}
