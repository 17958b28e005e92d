//! Surrogate ids and the natural-key maps that resolve them.
//!
//! A [`KeyMap`] mirrors one exchange-scoped dimension in memory. It is
//! preloaded once per run and then kept current batch by batch: ids created
//! inside a batch transaction are *staged* and only become *committed* once the
//! transaction commits. A rollback discards the staged entries, so the map never
//! points at rows the store no longer has.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use ::duckdb::types::ToSqlOutput;
use ::duckdb::{params, Connection, ToSql};
use fnostar_core::{InstrumentKey, OptionType, StrikePrice};
use serde::Serialize;
use time::Date;

use crate::sql::epoch_day_column;
use crate::WarehouseError;

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> ::duckdb::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

surrogate_id!(
    /// Surrogate id of a `reference_entity` row.
    ExchangeId
);
surrogate_id!(
    /// Surrogate id of an `instrument` row.
    InstrumentId
);
surrogate_id!(
    /// Surrogate id of a `contract` row.
    ContractId
);

/// Natural key of a contract once its instrument has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractKey {
    pub instrument_id: InstrumentId,
    pub expiry_date: Date,
    pub strike_price: Option<StrikePrice>,
    pub option_type: Option<OptionType>,
}

/// Natural key to surrogate id map with transaction-scoped staging.
#[derive(Debug, Clone)]
pub struct KeyMap<K, V> {
    committed: HashMap<K, V>,
    staged: HashMap<K, V>,
}

pub type InstrumentMap = KeyMap<InstrumentKey, InstrumentId>;
pub type ContractMap = KeyMap<ContractKey, ContractId>;

impl<K, V> Default for KeyMap<K, V> {
    fn default() -> Self {
        Self {
            committed: HashMap::new(),
            staged: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: Copy> KeyMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key among committed and staged entries.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.staged
            .get(key)
            .or_else(|| self.committed.get(key))
            .copied()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Record an id resolved inside an open transaction.
    pub fn stage(&mut self, key: K, value: V) {
        if !self.committed.contains_key(&key) {
            self.staged.insert(key, value);
        }
    }

    /// Promote staged entries after their transaction committed.
    pub fn commit_staged(&mut self) {
        self.committed.extend(self.staged.drain());
    }

    /// Drop staged entries after their transaction rolled back.
    pub fn discard_staged(&mut self) {
        self.staged.clear();
    }

    pub fn len(&self) -> usize {
        self.committed.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    fn insert_committed(&mut self, key: K, value: V) {
        self.committed.insert(key, value);
    }
}

impl InstrumentMap {
    /// Load every instrument of an exchange as committed entries.
    pub fn preload_instruments(
        connection: &Connection,
        exchange_id: ExchangeId,
    ) -> Result<Self, WarehouseError> {
        let mut statement = connection
            .prepare("SELECT id, symbol, instrument_type FROM instrument WHERE reference_id = ?")?;
        let mut rows = statement.query(params![exchange_id])?;

        let mut map = Self::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let symbol: String = row.get(1)?;
            let instrument_type: String = row.get(2)?;
            map.insert_committed(InstrumentKey::new(symbol, instrument_type), InstrumentId::new(id));
        }
        Ok(map)
    }
}

impl ContractMap {
    /// Load every contract of an exchange's instruments as committed entries.
    pub fn preload_contracts(
        connection: &Connection,
        exchange_id: ExchangeId,
    ) -> Result<Self, WarehouseError> {
        let mut statement = connection.prepare(
            r"
SELECT
    c.id,
    c.instrument_id,
    date_diff('day', DATE '1970-01-01', c.expiry_date),
    CAST(c.strike_price * 100 AS BIGINT),
    c.option_type
FROM contract c
JOIN instrument i ON i.id = c.instrument_id
WHERE i.reference_id = ?
",
        )?;
        let mut rows = statement.query(params![exchange_id])?;

        let mut map = Self::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let instrument_id: i64 = row.get(1)?;
            let strike: Option<i64> = row.get(3)?;
            let option_type: Option<String> = row.get(4)?;
            let key = ContractKey {
                instrument_id: InstrumentId::new(instrument_id),
                expiry_date: epoch_day_column(row, 2)?,
                strike_price: strike.map(StrikePrice::from_hundredths),
                option_type: option_type.as_deref().and_then(OptionType::normalize),
            };
            map.insert_committed(key, ContractId::new(id));
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::register_exchange;
    use crate::test_support::open_temp;

    #[test]
    fn staged_entries_are_visible_until_discarded() {
        let mut map: KeyMap<String, i64> = KeyMap::new();
        map.stage(String::from("NIFTY"), 1);

        assert_eq!(map.get("NIFTY"), Some(1));
        assert_eq!(map.staged_len(), 1);

        map.discard_staged();
        assert_eq!(map.get("NIFTY"), None);
        assert!(map.is_empty());
    }

    #[test]
    fn committed_entries_survive_later_rollbacks() {
        let mut map: KeyMap<String, i64> = KeyMap::new();
        map.stage(String::from("NIFTY"), 1);
        map.commit_staged();
        map.stage(String::from("BANKNIFTY"), 2);
        map.discard_staged();

        assert_eq!(map.get("NIFTY"), Some(1));
        assert_eq!(map.get("BANKNIFTY"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn preload_reads_only_the_exchange_dimension() {
        let (_temp, warehouse) = open_temp();
        let connection = warehouse.connection();
        let nse = register_exchange(connection, "NSE").expect("nse").id;
        let bse = register_exchange(connection, "BSE").expect("bse").id;
        connection
            .execute(
                "INSERT INTO instrument (reference_id, symbol, instrument_type) VALUES (?, 'NIFTY', 'FUTIDX'), (?, 'SENSEX', 'FUTIDX')",
                params![nse, bse],
            )
            .expect("seed instruments");
        connection
            .execute_batch(
                "INSERT INTO contract (instrument_id, expiry_date, strike_price, option_type)
                 SELECT id, DATE '2024-01-25', 21500.50, 'CE' FROM instrument WHERE symbol = 'NIFTY';
                 INSERT INTO contract (instrument_id, expiry_date)
                 SELECT id, DATE '2024-01-25' FROM instrument WHERE symbol = 'SENSEX';",
            )
            .expect("seed contracts");

        let instruments = InstrumentMap::preload_instruments(connection, nse).expect("instruments");
        let contracts = ContractMap::preload_contracts(connection, nse).expect("contracts");

        assert_eq!(instruments.len(), 1);
        let nifty = instruments
            .get(&InstrumentKey::new("NIFTY", "FUTIDX"))
            .expect("nifty id");
        assert_eq!(contracts.len(), 1);
        let key = ContractKey {
            instrument_id: nifty,
            expiry_date: time::macros::date!(2024 - 01 - 25),
            strike_price: Some(StrikePrice::from_hundredths(2_150_050)),
            option_type: OptionType::normalize("CE"),
        };
        assert!(contracts.contains(&key));
    }
}
