//! Exchange master data.
//!
//! Exchanges are registered by an operator and only read by the pipeline: an
//! ingest run against an unknown exchange fails before any batch is touched.

use ::duckdb::{params, Connection, OptionalExt};
use serde::Serialize;

use crate::keys::ExchangeId;
use crate::WarehouseError;

/// A `reference_entity` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub name: String,
}

/// Resolve the surrogate id of the named exchange.
///
/// # Errors
/// Returns [`WarehouseError::Configuration`] if the exchange is not registered.
pub fn resolve_exchange(connection: &Connection, name: &str) -> Result<ExchangeId, WarehouseError> {
    let name = normalize_name(name)?;
    let id: Option<i64> = connection
        .query_row(
            "SELECT id FROM reference_entity WHERE name = ?",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    id.map(ExchangeId::new).ok_or_else(|| {
        WarehouseError::Configuration(format!(
            "exchange '{name}' is not registered; add it with `fnostar exchange add {name}`"
        ))
    })
}

/// Register an exchange if it is not present yet and return its row.
pub fn register_exchange(connection: &Connection, name: &str) -> Result<Exchange, WarehouseError> {
    let name = normalize_name(name)?;
    connection.execute(
        "INSERT INTO reference_entity (name) VALUES (?) ON CONFLICT DO NOTHING",
        params![name],
    )?;
    let id = resolve_exchange(connection, name)?;
    Ok(Exchange {
        id,
        name: name.to_owned(),
    })
}

pub fn list_exchanges(connection: &Connection) -> Result<Vec<Exchange>, WarehouseError> {
    let mut statement = connection.prepare("SELECT id, name FROM reference_entity ORDER BY name")?;
    let rows = statement.query_map([], |row| {
        Ok(Exchange {
            id: ExchangeId::new(row.get(0)?),
            name: row.get(1)?,
        })
    })?;

    let mut exchanges = Vec::new();
    for exchange in rows {
        exchanges.push(exchange?);
    }
    Ok(exchanges)
}

fn normalize_name(name: &str) -> Result<&str, WarehouseError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WarehouseError::Configuration(String::from(
            "exchange name must not be blank",
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_temp;

    #[test]
    fn unknown_exchange_is_a_configuration_error() {
        let (_temp, warehouse) = open_temp();

        let error = resolve_exchange(warehouse.connection(), "MCX").expect_err("must fail");

        assert!(matches!(error, WarehouseError::Configuration(message) if message.contains("MCX")));
    }

    #[test]
    fn registering_twice_keeps_one_row() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();

        let first = register_exchange(connection, "NSE").expect("first");
        let second = register_exchange(connection, " NSE ").expect("second");

        assert_eq!(first, second);
        assert_eq!(list_exchanges(connection).expect("list").len(), 1);
        assert_eq!(resolve_exchange(connection, "NSE").expect("resolve"), first.id);
    }

    #[test]
    fn blank_names_are_rejected() {
        let (_temp, warehouse) = open_temp();
        assert!(register_exchange(warehouse.connection(), "  ").is_err());
    }

    #[test]
    fn exchanges_are_listed_by_name() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        register_exchange(connection, "NSE").expect("nse");
        register_exchange(connection, "BSE").expect("bse");

        let names: Vec<String> = list_exchanges(connection)
            .expect("list")
            .into_iter()
            .map(|exchange| exchange.name)
            .collect();
        assert_eq!(names, vec!["BSE", "NSE"]);
    }
}
