use std::fmt::{Display, Formatter};

use crate::ValidationError;

/// Option strike price held in hundredths of the quote currency.
///
/// Fixed point keeps the value `Eq + Hash`, so it can sit inside a contract
/// natural key; the store column is `DECIMAL(18,2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrikePrice(i64);

impl StrikePrice {
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    /// Parse a strike column value. Blank input means "no strike".
    pub fn parse(raw: &str) -> Result<Option<Self>, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value = trimmed
            .parse::<f64>()
            .map_err(|_| ValidationError::InvalidNumber {
                field: "STRIKE_PR",
                value: trimmed.to_owned(),
            })?;
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "STRIKE_PR" });
        }
        if value < 0.0 {
            return Err(ValidationError::NegativeStrike {
                value: trimmed.to_owned(),
            });
        }

        Ok(Some(Self((value * 100.0).round() as i64)))
    }
}

impl Display for StrikePrice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strikes_exactly() {
        let strike = StrikePrice::parse("17550.50").expect("parse").expect("present");
        assert_eq!(strike.hundredths(), 1_755_050);
        assert_eq!(strike.to_string(), "17550.50");
    }

    #[test]
    fn zero_strike_is_present_but_blank_is_absent() {
        assert_eq!(
            StrikePrice::parse("0").expect("zero"),
            Some(StrikePrice::from_hundredths(0))
        );
        assert_eq!(StrikePrice::parse("  ").expect("blank"), None);
    }

    #[test]
    fn equal_values_written_differently_compare_equal() {
        assert_eq!(
            StrikePrice::parse("100").expect("a"),
            StrikePrice::parse("100.00").expect("b")
        );
    }

    #[test]
    fn rejects_negative_and_non_numeric_strikes() {
        assert!(matches!(
            StrikePrice::parse("-5"),
            Err(ValidationError::NegativeStrike { .. })
        ));
        assert!(matches!(
            StrikePrice::parse("abc"),
            Err(ValidationError::InvalidNumber { .. })
        ));
    }
}
