//! Money types with exact integer arithmetic
//!
//! Every amount that flows through payment allocation is an integer count of
//! minor currency units (cents, centavos). Decimal values only appear at the
//! edges: converting user-entered major amounts and applying rates before an
//! amount becomes a charge.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    MXN,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::MXN => "MX$",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CAD => "CAD",
            Currency::MXN => "MXN",
        }
    }

    fn minor_per_major(&self) -> Decimal {
        Decimal::from(10_i64.pow(self.decimal_places()))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CAD" => Ok(Currency::CAD),
            "MXN" => Ok(Currency::MXN),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// An exact amount in minor currency units
///
/// Arithmetic is checked: overflow is reported, never wrapped. Amounts can be
/// negative (a credit delta, for example), but charges and funds are validated
/// as non-negative by the code that accepts them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub const ZERO: MinorUnits = MinorUnits(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw integer value
    pub const fn value(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: MinorUnits) -> Result<MinorUnits, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(MinorUnits)
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_sub(self, other: MinorUnits) -> Result<MinorUnits, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(MinorUnits)
            .ok_or(MoneyError::Overflow)
    }

    /// Absolute difference between two amounts
    pub fn abs_diff(self, other: MinorUnits) -> MinorUnits {
        MinorUnits(self.0.abs_diff(other.0).min(i64::MAX as u64) as i64)
    }

    /// Sums an iterator of amounts, failing on overflow
    pub fn checked_sum<I>(amounts: I) -> Result<MinorUnits, MoneyError>
    where
        I: IntoIterator<Item = MinorUnits>,
    {
        amounts
            .into_iter()
            .try_fold(MinorUnits::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Converts a major-unit amount (e.g. `150.25`) into minor units
    ///
    /// The amount must already be expressed at the currency's precision; a
    /// value with fractional minor units is rejected rather than rounded.
    pub fn from_major(amount: Decimal, currency: Currency) -> Result<MinorUnits, MoneyError> {
        let minor = amount
            .checked_mul(currency.minor_per_major())
            .ok_or(MoneyError::Overflow)?;
        if minor.fract() != Decimal::ZERO {
            return Err(MoneyError::InvalidAmount(format!(
                "{} has more than {} decimal places for {}",
                amount,
                currency.decimal_places(),
                currency
            )));
        }
        Self::from_decimal_minor(minor)
    }

    /// Rounds a fractional minor-unit value to a whole amount (banker's rounding)
    pub fn from_decimal_minor_rounded(minor: Decimal) -> Result<MinorUnits, MoneyError> {
        Self::from_decimal_minor(
            minor.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven),
        )
    }

    fn from_decimal_minor(minor: Decimal) -> Result<MinorUnits, MoneyError> {
        minor.trunc().to_i64().map(MinorUnits).ok_or(MoneyError::Overflow)
    }

    /// Converts to a major-unit decimal for display and wire formats
    pub fn to_major(self, currency: Currency) -> Decimal {
        let mut major = Decimal::from(self.0) / currency.minor_per_major();
        major.rescale(currency.decimal_places());
        major
    }

    /// Formats the amount with the currency symbol
    pub fn display_in(self, currency: Currency) -> String {
        format!("{} {}", currency.symbol(), self.to_major(currency))
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Sum for MinorUnits {
    /// Unchecked sum for amounts already known to be bounded (test helpers,
    /// display totals). Allocation code uses [`MinorUnits::checked_sum`].
    fn sum<I: Iterator<Item = MinorUnits>>(iter: I) -> Self {
        MinorUnits(iter.map(|m| m.0).sum())
    }
}

/// Represents a percentage rate (e.g., a monthly late-payment rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a decimal (e.g., 0.05 for 5%)
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal value (e.g., 0.05 for 5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g., 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Applies this rate to an amount, returning unrounded minor units
    pub fn apply(&self, amount: MinorUnits) -> Decimal {
        Decimal::from(amount.value()) * self.value
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn major_conversion_is_lossless(minor in -1_000_000_000i64..1_000_000_000i64) {
            let m = MinorUnits::new(minor);
            let back = MinorUnits::from_major(m.to_major(Currency::MXN), Currency::MXN).unwrap();
            prop_assert_eq!(back, m);
        }

        #[test]
        fn checked_sum_matches_plain_sum(values in proptest::collection::vec(0i64..1_000_000i64, 0..50)) {
            let total = MinorUnits::checked_sum(values.iter().copied().map(MinorUnits::new)).unwrap();
            prop_assert_eq!(total.value(), values.iter().sum::<i64>());
        }
    }
}
