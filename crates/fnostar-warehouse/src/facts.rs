//! Fact loader: resolve a batch against both key maps and append `trade_fact` rows.

use std::collections::HashMap;

use ::duckdb::{Connection, ToSql};
use fnostar_core::{Batch, OptionType, StrikePrice, TradeMeasures};
use time::Date;

use crate::keys::{ContractId, ContractKey, ContractMap, InstrumentId, InstrumentMap};
use crate::sql::values_list;
use crate::WarehouseError;

/// A `trade_fact` row with its surrogate keys resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeFact {
    pub instrument_id: InstrumentId,
    pub contract_id: ContractId,
    pub trade_date: Date,
    pub measures: TradeMeasures,
}

const FACT_CASTS: [&str; 12] = [
    "BIGINT", "BIGINT", "DATE", "DOUBLE", "DOUBLE", "DOUBLE", "DOUBLE", "DOUBLE", "BIGINT",
    "BIGINT", "BIGINT", "DOUBLE",
];

type ContractLookup<'a> = (InstrumentId, Date, Option<StrikePrice>, Option<&'a OptionType>);

/// Build the facts of a batch from the key maps.
///
/// Lookups are memoized per distinct natural key, so each key is hashed into
/// the maps once per batch however many rows share it.
///
/// # Errors
/// Returns [`WarehouseError::ReferentialIntegrity`] if any row's instrument or
/// contract is not in the maps. The message names the first such line and the
/// number of unresolved rows.
pub fn resolve_facts(
    batch: &Batch,
    instruments: &InstrumentMap,
    contracts: &ContractMap,
) -> Result<Vec<TradeFact>, WarehouseError> {
    let mut instrument_ids: HashMap<(&str, &str), Option<InstrumentId>> = HashMap::new();
    let mut contract_ids: HashMap<ContractLookup<'_>, Option<ContractId>> = HashMap::new();
    let mut facts = Vec::with_capacity(batch.len());
    let mut unresolved = 0_usize;
    let mut first_unresolved = None;

    for row in &batch.rows {
        let instrument_id = *instrument_ids
            .entry((row.symbol.as_str(), row.instrument_type.as_str()))
            .or_insert_with(|| instruments.get(&row.instrument_key()));

        let contract_id = instrument_id.and_then(|instrument_id| {
            *contract_ids
                .entry((
                    instrument_id,
                    row.expiry_date,
                    row.strike_price,
                    row.option_type.as_ref(),
                ))
                .or_insert_with(|| {
                    contracts.get(&ContractKey {
                        instrument_id,
                        expiry_date: row.expiry_date,
                        strike_price: row.strike_price,
                        option_type: row.option_type.clone(),
                    })
                })
        });

        match (instrument_id, contract_id) {
            (Some(instrument_id), Some(contract_id)) => facts.push(TradeFact {
                instrument_id,
                contract_id,
                trade_date: row.trade_date,
                measures: row.measures,
            }),
            _ => {
                unresolved += 1;
                first_unresolved.get_or_insert(row.line);
            }
        }
    }

    if let Some(line) = first_unresolved {
        return Err(WarehouseError::ReferentialIntegrity(format!(
            "{unresolved} row(s) in batch {} have unresolved dimension keys, first at line {line}",
            batch.index
        )));
    }

    Ok(facts)
}

/// Append facts using multi-row inserts of at most `chunk_rows` rows each.
///
/// # Errors
/// Returns [`WarehouseError::Configuration`] for a zero chunk size, or a store
/// error if an insert fails.
pub fn insert_facts(
    connection: &Connection,
    facts: &[TradeFact],
    chunk_rows: usize,
) -> Result<usize, WarehouseError> {
    if chunk_rows == 0 {
        return Err(WarehouseError::Configuration(String::from(
            "fact chunk size must be greater than zero",
        )));
    }

    let mut inserted = 0;
    for chunk in facts.chunks(chunk_rows) {
        let trade_dates: Vec<String> = chunk.iter().map(|fact| fact.trade_date.to_string()).collect();
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * FACT_CASTS.len());
        for (fact, trade_date) in chunk.iter().zip(&trade_dates) {
            let measures = &fact.measures;
            let row: [&dyn ToSql; 12] = [
                &fact.instrument_id,
                &fact.contract_id,
                trade_date,
                &measures.open,
                &measures.high,
                &measures.low,
                &measures.close,
                &measures.settle_price,
                &measures.open_interest,
                &measures.change_in_oi,
                &measures.contracts_traded,
                &measures.value_in_lakh,
            ];
            params.extend(row);
        }

        let sql = format!(
            r"
INSERT INTO trade_fact (
    instrument_id, contract_id, trade_date, open, high, low, close, settle_price,
    open_interest, change_in_oi, contracts_traded, value_in_lakh
) VALUES {values}
",
            values = values_list(&FACT_CASTS, chunk.len()),
        );
        inserted += connection.execute(sql.as_str(), params.as_slice())?;
    }

    Ok(inserted)
}

/// Resolve and append the facts of a batch; nothing is written if any row
/// fails to resolve.
pub fn load_facts(
    connection: &Connection,
    batch: &Batch,
    instruments: &InstrumentMap,
    contracts: &ContractMap,
    chunk_rows: usize,
) -> Result<usize, WarehouseError> {
    let facts = resolve_facts(batch, instruments, contracts)?;
    insert_facts(connection, &facts, chunk_rows)
}
