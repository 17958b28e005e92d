//! Database views for analytical queries.

use ::duckdb::Connection;

/// Create database views over the star schema.
///
/// Creates the following views:
/// - `vw_trades`: facts with their exchange, instrument and contract natural keys
/// - `vw_instrument_activity`: contracts traded, value and open interest per
///   instrument and trade date
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_trades AS
SELECT
    r.name AS exchange,
    i.symbol,
    i.instrument_type,
    c.expiry_date,
    c.strike_price,
    c.option_type,
    f.trade_date,
    f.open,
    f.high,
    f.low,
    f.close,
    f.settle_price,
    f.contracts_traded,
    f.value_in_lakh,
    f.open_interest,
    f.change_in_oi,
    f.instrument_id,
    f.contract_id
FROM trade_fact f
JOIN instrument i ON i.id = f.instrument_id
JOIN contract c ON c.id = f.contract_id
JOIN reference_entity r ON r.id = i.reference_id;

CREATE OR REPLACE VIEW vw_instrument_activity AS
SELECT
    exchange,
    symbol,
    instrument_type,
    trade_date,
    COUNT(DISTINCT contract_id) AS contracts_listed,
    SUM(contracts_traded)::BIGINT AS contracts_traded,
    SUM(value_in_lakh)::DOUBLE AS value_in_lakh,
    SUM(open_interest)::BIGINT AS open_interest
FROM vw_trades
GROUP BY exchange, symbol, instrument_type, trade_date;
",
    )?;

    Ok(())
}
