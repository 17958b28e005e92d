//! `DuckDB` session setup.

use ::duckdb::Connection;

use crate::sql::escape_sql_string;
use crate::WarehouseConfig;

/// Open the read-write session for a warehouse file.
///
/// # Errors
/// Returns an error if the database file cannot be opened or configured.
pub fn open_connection(config: &WarehouseConfig) -> Result<Connection, ::duckdb::Error> {
    let connection = Connection::open(config.db_path.as_path())?;
    configure_connection(&connection, config.memory_limit.as_deref())?;
    Ok(connection)
}

/// Configure a database connection with session settings.
///
/// # Errors
/// Returns an error if configuration SQL fails to execute, including an
/// unparseable memory limit.
fn configure_connection(
    connection: &Connection,
    memory_limit: Option<&str>,
) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    if let Some(limit) = memory_limit {
        // SET takes no bind parameters.
        let statement = format!("SET memory_limit = '{}';", escape_sql_string(limit.trim()));
        connection.execute_batch(statement.as_str())?;
    }
    Ok(())
}
