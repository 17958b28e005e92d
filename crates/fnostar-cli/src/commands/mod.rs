mod exchange;
mod load;
mod status;

use fnostar_warehouse::{Warehouse, WarehouseConfig};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = warehouse_config(cli);
    debug!(db = %config.db_path.display(), "opening warehouse");
    let warehouse = Warehouse::open(config)?;

    match &cli.command {
        Command::Load(args) => load::run(&warehouse, args),
        Command::Exchange(args) => exchange::run(&warehouse, args),
        Command::Status => status::run(&warehouse),
    }
}

fn warehouse_config(cli: &Cli) -> WarehouseConfig {
    let mut config = WarehouseConfig::default();
    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    config.memory_limit.clone_from(&cli.memory_limit);
    config
}
