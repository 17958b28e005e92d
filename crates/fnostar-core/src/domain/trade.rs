use time::Date;

use super::{OptionType, StrikePrice};

/// Natural key of an instrument within one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentKey {
    pub symbol: String,
    pub instrument_type: String,
}

impl InstrumentKey {
    pub fn new(symbol: impl Into<String>, instrument_type: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            instrument_type: instrument_type.into(),
        }
    }
}

/// End-of-day trade measures carried unchanged into the fact table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeMeasures {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub settle_price: f64,
    pub contracts_traded: i64,
    pub value_in_lakh: f64,
    pub open_interest: i64,
    pub change_in_oi: i64,
}

/// One normalized source row.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    /// 1-based line number in the source file.
    pub line: u64,
    pub symbol: String,
    pub instrument_type: String,
    pub expiry_date: Date,
    pub strike_price: Option<StrikePrice>,
    pub option_type: Option<OptionType>,
    pub trade_date: Date,
    pub measures: TradeMeasures,
}

impl TradeRow {
    pub fn instrument_key(&self) -> InstrumentKey {
        InstrumentKey::new(self.symbol.as_str(), self.instrument_type.as_str())
    }
}
