use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Neg;

use super::error::CoreError;

/// A signed amount with two decimal places. Negative values are outflows.
///
/// Serializes as a decimal string (`"-25.50"`) and accepts either a string or
/// a JSON number on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Money(Decimal);

impl Money {
    /// Largest accepted magnitude when building from a decimal. Keeps every
    /// amount representable as `i64` cents.
    pub const MAX_ABS: Decimal = Decimal::from_parts(u32::MAX, i32::MAX as u32, 0, false, 2);

    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// Exact for every value `from_cents` or `try_from_decimal` can produce.
    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::ONE_HUNDRED).to_i64().unwrap_or_default()
    }

    /// Rounds to cents and rejects magnitudes above [`Money::MAX_ABS`].
    pub fn try_from_decimal(decimal: Decimal) -> Result<Self, CoreError> {
        let mut value = decimal.round_dp(2);
        if value.abs() > Self::MAX_ABS {
            return Err(CoreError::InvalidAmount(decimal.to_string()));
        }
        value.rescale(2);
        Ok(Money(value))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let decimal = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::try_from_decimal(decimal).map_err(de::Error::custom)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(-2550).to_cents(), -2550);
        assert_eq!(Money::from_cents(1).to_string(), "0.01");
    }

    #[test]
    fn from_decimal_rounds_to_cents() {
        let m = Money::try_from_decimal(Decimal::from_str("10.005").unwrap()).unwrap();
        assert_eq!(m.to_cents(), 1000);
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        let limit = Money::try_from_decimal(Money::MAX_ABS).unwrap();
        assert_eq!(Money::from_cents(limit.to_cents()), limit);
        assert_eq!((-limit).to_cents(), -limit.to_cents());

        let huge = Decimal::from_str("99999999999999999999.00").unwrap();
        assert!(matches!(
            Money::try_from_decimal(huge),
            Err(CoreError::InvalidAmount(_))
        ));
        assert!(serde_json::from_str::<Money>("\"99999999999999999999\"").is_err());
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let a: Money = serde_json::from_str("\"-25.50\"").unwrap();
        let b: Money = serde_json::from_str("-25.5").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"-25.50\"");
    }
}
