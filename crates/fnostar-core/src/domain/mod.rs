pub mod date;
pub mod option_type;
pub mod strike;
pub mod trade;

pub use date::{from_epoch_day, parse_source_date};
pub use option_type::OptionType;
pub use strike::StrikePrice;
pub use trade::{InstrumentKey, TradeMeasures, TradeRow};
