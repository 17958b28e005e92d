//! Instrument and contract dimension loaders.
//!
//! Both loaders follow the same shape: collapse the batch to its distinct
//! natural keys, drop the keys the map already knows, insert the rest with an
//! "insert if absent" statement, then read back the ids of exactly those keys
//! and stage them in the map. All statements run on the caller's connection,
//! inside the caller's transaction.

use std::collections::{BTreeSet, HashMap};

use ::duckdb::{Connection, ToSql};
use fnostar_core::{Batch, InstrumentKey, OptionType, StrikePrice};
use time::Date;

use crate::keys::{ContractId, ContractKey, ContractMap, ExchangeId, InstrumentId, InstrumentMap};
use crate::sql::{values_list, KEY_CHUNK};
use crate::WarehouseError;

/// Outcome of one dimension load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionLoad {
    /// Distinct natural keys observed in the batch.
    pub distinct_keys: usize,
    /// Rows actually written to the store.
    pub inserted: usize,
}

const INSTRUMENT_CASTS: [&str; 3] = ["BIGINT", "VARCHAR", "VARCHAR"];
const CONTRACT_CASTS: [&str; 5] = ["BIGINT", "BIGINT", "DATE", "DECIMAL(18,2)", "VARCHAR"];

/// Create the batch's unseen instruments and stage their ids.
///
/// # Errors
/// Returns an error if a statement fails or an inserted key cannot be read back.
pub fn load_instruments(
    connection: &Connection,
    batch: &Batch,
    exchange_id: ExchangeId,
    instruments: &mut InstrumentMap,
) -> Result<DimensionLoad, WarehouseError> {
    let distinct: BTreeSet<(&str, &str)> = batch
        .rows
        .iter()
        .map(|row| (row.symbol.as_str(), row.instrument_type.as_str()))
        .collect();
    let missing: Vec<(&str, &str)> = distinct
        .iter()
        .copied()
        .filter(|(symbol, instrument_type)| {
            !instruments.contains(&InstrumentKey::new(*symbol, *instrument_type))
        })
        .collect();

    let mut inserted = 0;
    for chunk in missing.chunks(KEY_CHUNK) {
        let ordinals: Vec<i64> = (0..).take(chunk.len()).collect();
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * 3 + 1);
        for (ordinal, (symbol, instrument_type)) in ordinals.iter().zip(chunk) {
            let row: [&dyn ToSql; 3] = [ordinal, symbol, instrument_type];
            params.extend(row);
        }
        params.push(&exchange_id);

        let values = values_list(&INSTRUMENT_CASTS, chunk.len());
        let exchange_param = INSTRUMENT_CASTS.len() * chunk.len() + 1;

        let insert = format!(
            r"
INSERT INTO instrument (reference_id, symbol, instrument_type)
SELECT ${exchange_param}, v.symbol, v.instrument_type
FROM (VALUES {values}) AS v(ord, symbol, instrument_type)
WHERE NOT EXISTS (
    SELECT 1 FROM instrument i
    WHERE i.reference_id = ${exchange_param}
      AND i.symbol = v.symbol
      AND i.instrument_type = v.instrument_type
)
"
        );
        inserted += connection.execute(insert.as_str(), params.as_slice())?;

        let lookup = format!(
            r"
SELECT v.ord, i.id
FROM (VALUES {values}) AS v(ord, symbol, instrument_type)
JOIN instrument i
  ON i.reference_id = ${exchange_param}
 AND i.symbol = v.symbol
 AND i.instrument_type = v.instrument_type
"
        );
        let mut statement = connection.prepare(lookup.as_str())?;
        let mut rows = statement.query(params.as_slice())?;
        while let Some(row) = rows.next()? {
            let ordinal: i64 = row.get(0)?;
            let id: i64 = row.get(1)?;
            if let Some((symbol, instrument_type)) = chunk_entry(chunk, ordinal) {
                instruments.stage(
                    InstrumentKey::new(*symbol, *instrument_type),
                    InstrumentId::new(id),
                );
            }
        }
    }

    if let Some((symbol, instrument_type)) = missing
        .iter()
        .find(|(symbol, instrument_type)| {
            !instruments.contains(&InstrumentKey::new(*symbol, *instrument_type))
        })
    {
        return Err(WarehouseError::ReferentialIntegrity(format!(
            "instrument ({symbol}, {instrument_type}) has no id after insert"
        )));
    }

    Ok(DimensionLoad {
        distinct_keys: distinct.len(),
        inserted,
    })
}

type ContractTuple<'a> = (InstrumentId, Date, Option<StrikePrice>, Option<&'a OptionType>);

/// Create the batch's unseen contracts and stage their ids.
///
/// Every row's instrument must already resolve through `instruments`.
///
/// # Errors
/// Returns [`WarehouseError::ReferentialIntegrity`] for a row whose instrument
/// is unknown, or a store error if a statement fails.
pub fn load_contracts(
    connection: &Connection,
    batch: &Batch,
    instruments: &InstrumentMap,
    contracts: &mut ContractMap,
) -> Result<DimensionLoad, WarehouseError> {
    let mut instrument_ids: HashMap<(&str, &str), InstrumentId> = HashMap::new();
    let mut distinct: BTreeSet<ContractTuple<'_>> = BTreeSet::new();
    for row in &batch.rows {
        let natural = (row.symbol.as_str(), row.instrument_type.as_str());
        let instrument_id = match instrument_ids.get(&natural) {
            Some(id) => *id,
            None => {
                let id = instruments.get(&row.instrument_key()).ok_or_else(|| {
                    WarehouseError::ReferentialIntegrity(format!(
                        "line {}: instrument ({}, {}) is not loaded",
                        row.line, row.symbol, row.instrument_type
                    ))
                })?;
                instrument_ids.insert(natural, id);
                id
            }
        };
        distinct.insert((
            instrument_id,
            row.expiry_date,
            row.strike_price,
            row.option_type.as_ref(),
        ));
    }

    let missing: Vec<ContractKey> = distinct
        .iter()
        .map(contract_key)
        .filter(|key| !contracts.contains(key))
        .collect();

    let mut inserted = 0;
    for chunk in missing.chunks(KEY_CHUNK) {
        inserted += insert_contract_chunk(connection, chunk, contracts)?;
    }

    if let Some(key) = missing.iter().find(|key| !contracts.contains(*key)) {
        return Err(WarehouseError::ReferentialIntegrity(format!(
            "contract for instrument {} expiring {} has no id after insert",
            key.instrument_id, key.expiry_date
        )));
    }

    Ok(DimensionLoad {
        distinct_keys: distinct.len(),
        inserted,
    })
}

fn insert_contract_chunk(
    connection: &Connection,
    chunk: &[ContractKey],
    contracts: &mut ContractMap,
) -> Result<usize, WarehouseError> {
    let ordinals: Vec<i64> = (0..).take(chunk.len()).collect();
    let expiries: Vec<String> = chunk.iter().map(|key| key.expiry_date.to_string()).collect();
    let strikes: Vec<Option<String>> = chunk
        .iter()
        .map(|key| key.strike_price.map(|strike| strike.to_string()))
        .collect();
    let option_types: Vec<Option<&str>> = chunk
        .iter()
        .map(|key| key.option_type.as_ref().map(OptionType::as_str))
        .collect();

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * CONTRACT_CASTS.len());
    for (index, key) in chunk.iter().enumerate() {
        let row: [&dyn ToSql; 5] = [
            &ordinals[index],
            &key.instrument_id,
            &expiries[index],
            &strikes[index],
            &option_types[index],
        ];
        params.extend(row);
    }

    let values = values_list(&CONTRACT_CASTS, chunk.len());
    let insert = format!(
        r"
INSERT INTO contract (instrument_id, expiry_date, strike_price, option_type)
SELECT v.instrument_id, v.expiry_date, v.strike_price, v.option_type
FROM (VALUES {values}) AS v(ord, instrument_id, expiry_date, strike_price, option_type)
WHERE NOT EXISTS (
    SELECT 1 FROM contract c
    WHERE c.instrument_id = v.instrument_id
      AND c.expiry_date = v.expiry_date
      AND c.strike_price IS NOT DISTINCT FROM v.strike_price
      AND c.option_type IS NOT DISTINCT FROM v.option_type
)
"
    );
    let inserted = connection.execute(insert.as_str(), params.as_slice())?;

    let lookup = format!(
        r"
SELECT v.ord, MIN(c.id)
FROM (VALUES {values}) AS v(ord, instrument_id, expiry_date, strike_price, option_type)
JOIN contract c
  ON c.instrument_id = v.instrument_id
 AND c.expiry_date = v.expiry_date
 AND c.strike_price IS NOT DISTINCT FROM v.strike_price
 AND c.option_type IS NOT DISTINCT FROM v.option_type
GROUP BY v.ord
"
    );
    let mut statement = connection.prepare(lookup.as_str())?;
    let mut rows = statement.query(params.as_slice())?;
    while let Some(row) = rows.next()? {
        let ordinal: i64 = row.get(0)?;
        let id: i64 = row.get(1)?;
        if let Some(key) = chunk_entry(chunk, ordinal) {
            contracts.stage(key.clone(), ContractId::new(id));
        }
    }

    Ok(inserted)
}

fn contract_key(tuple: &ContractTuple<'_>) -> ContractKey {
    let (instrument_id, expiry_date, strike_price, option_type) = *tuple;
    ContractKey {
        instrument_id,
        expiry_date,
        strike_price,
        option_type: option_type.cloned(),
    }
}

fn chunk_entry<T>(chunk: &[T], ordinal: i64) -> Option<&T> {
    usize::try_from(ordinal)
        .ok()
        .and_then(|index| chunk.get(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::register_exchange;
    use crate::test_support::open_temp;
    use fnostar_core::{TradeMeasures, TradeRow};
    use time::macros::date;

    fn row(line: u64, symbol: &str, kind: &str, strike: Option<i64>, option: &str) -> TradeRow {
        TradeRow {
            line,
            symbol: symbol.to_owned(),
            instrument_type: kind.to_owned(),
            expiry_date: date!(2024 - 01 - 25),
            strike_price: strike.map(StrikePrice::from_hundredths),
            option_type: OptionType::normalize(option),
            trade_date: date!(2024 - 01 - 02),
            measures: TradeMeasures {
                open: 100.0,
                high: 110.0,
                low: 95.0,
                close: 105.0,
                settle_price: 104.5,
                contracts_traded: 10,
                value_in_lakh: 1.25,
                open_interest: 500,
                change_in_oi: -20,
            },
        }
    }

    fn batch(rows: Vec<TradeRow>) -> Batch {
        Batch {
            index: 0,
            first_line: rows.first().map_or(2, |row| row.line),
            rows,
        }
    }

    fn count(connection: &Connection, table: &str) -> i64 {
        connection
            .query_row(format!("SELECT COUNT(*) FROM {table}").as_str(), [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn duplicate_instrument_pairs_collapse_to_one_row() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        let exchange = register_exchange(connection, "NSE").expect("exchange").id;
        let mut instruments = InstrumentMap::new();
        let batch = batch(vec![
            row(2, "NIFTY", "OPTIDX", Some(2_150_000), "CE"),
            row(3, "NIFTY", "OPTIDX", Some(2_150_000), "PE"),
            row(4, "NIFTY", "FUTIDX", None, ""),
        ]);

        let load = load_instruments(connection, &batch, exchange, &mut instruments).expect("load");

        assert_eq!(load, DimensionLoad { distinct_keys: 2, inserted: 2 });
        assert_eq!(count(connection, "instrument"), 2);
        assert!(instruments.contains(&InstrumentKey::new("NIFTY", "OPTIDX")));
        assert_eq!(instruments.staged_len(), 2);
    }

    #[test]
    fn known_instruments_are_not_inserted_again() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        let exchange = register_exchange(connection, "NSE").expect("exchange").id;
        let batch = batch(vec![row(2, "NIFTY", "FUTIDX", None, "")]);

        let mut first = InstrumentMap::new();
        load_instruments(connection, &batch, exchange, &mut first).expect("first");
        let mut second = InstrumentMap::new();
        let load = load_instruments(connection, &batch, exchange, &mut second).expect("second");

        assert_eq!(load.inserted, 0);
        assert_eq!(
            first.get(&InstrumentKey::new("NIFTY", "FUTIDX")),
            second.get(&InstrumentKey::new("NIFTY", "FUTIDX"))
        );
        assert_eq!(count(connection, "instrument"), 1);
    }

    #[test]
    fn contracts_with_null_strike_and_option_type_are_matched_null_safely() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        let exchange = register_exchange(connection, "NSE").expect("exchange").id;
        let batch = batch(vec![
            row(2, "NIFTY", "FUTIDX", None, "  "),
            row(3, "NIFTY", "FUTIDX", None, ""),
        ]);
        let mut instruments = InstrumentMap::new();
        load_instruments(connection, &batch, exchange, &mut instruments).expect("instruments");

        let mut contracts = ContractMap::new();
        let first = load_contracts(connection, &batch, &instruments, &mut contracts).expect("first");
        let mut fresh = ContractMap::new();
        let second = load_contracts(connection, &batch, &instruments, &mut fresh).expect("second");

        assert_eq!(first, DimensionLoad { distinct_keys: 1, inserted: 1 });
        assert_eq!(second.inserted, 0);
        assert_eq!(count(connection, "contract"), 1);
        let blank: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM contract WHERE option_type IS NULL AND strike_price IS NULL",
                [],
                |row| row.get(0),
            )
            .expect("null count");
        assert_eq!(blank, 1);
    }

    #[test]
    fn contract_loader_rejects_unknown_instruments() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        let batch = batch(vec![row(7, "BANKNIFTY", "FUTIDX", None, "")]);

        let error = load_contracts(
            connection,
            &batch,
            &InstrumentMap::new(),
            &mut ContractMap::new(),
        )
        .expect_err("must fail");

        assert!(
            matches!(error, WarehouseError::ReferentialIntegrity(ref message) if message.contains("line 7")),
            "{error}"
        );
        assert_eq!(count(connection, "contract"), 0);
    }

    #[test]
    fn strikes_keep_their_fractional_part() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        let exchange = register_exchange(connection, "NSE").expect("exchange").id;
        let batch = batch(vec![row(2, "RELIANCE", "OPTSTK", Some(245_050), "CE")]);
        let mut instruments = InstrumentMap::new();
        load_instruments(connection, &batch, exchange, &mut instruments).expect("instruments");
        let mut contracts = ContractMap::new();
        load_contracts(connection, &batch, &instruments, &mut contracts).expect("contracts");

        let (strike, option): (String, String) = connection
            .query_row(
                "SELECT CAST(strike_price AS VARCHAR), option_type FROM contract",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("contract row");
        assert_eq!(strike, "2450.50");
        assert_eq!(option, "CE");
    }

    #[test]
    fn option_type_case_is_part_of_the_contract_key() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        let exchange = register_exchange(connection, "NSE").expect("exchange").id;
        let batch = batch(vec![
            row(2, "NIFTY", "OPTIDX", Some(2_150_000), "ce"),
            row(3, "NIFTY", "OPTIDX", Some(2_150_000), "CE"),
        ]);
        let mut instruments = InstrumentMap::new();
        load_instruments(connection, &batch, exchange, &mut instruments).expect("instruments");
        let mut contracts = ContractMap::new();

        let load = load_contracts(connection, &batch, &instruments, &mut contracts).expect("contracts");

        assert_eq!(load, DimensionLoad { distinct_keys: 2, inserted: 2 });
        let codes: String = connection
            .query_row(
                "SELECT string_agg(option_type, ',' ORDER BY option_type) FROM contract",
                [],
                |row| row.get(0),
            )
            .expect("codes");
        assert_eq!(codes, "CE,ce");
    }
}
