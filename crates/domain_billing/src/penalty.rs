//! Late-payment penalties
//!
//! Bill sources report the penalty owed as of a date. Sources backed by raw
//! charges (rather than a billing system that already computes penalties)
//! use a [`PenaltyCalculator`] to derive it.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{MinorUnits, MoneyError, Rate};

const DAYS_PER_PENALTY_MONTH: i64 = 30;

/// Computes the penalty owed on an unpaid base amount
pub trait PenaltyCalculator: Send + Sync {
    /// Penalty owed on `base_outstanding` as of `as_of` for a bill due on `due_date`
    fn penalty_as_of(
        &self,
        base_outstanding: MinorUnits,
        due_date: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<MinorUnits, MoneyError>;
}

/// No late fees
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPenalty;

impl PenaltyCalculator for NoPenalty {
    fn penalty_as_of(
        &self,
        _base_outstanding: MinorUnits,
        _due_date: NaiveDate,
        _as_of: NaiveDate,
    ) -> Result<MinorUnits, MoneyError> {
        Ok(MinorUnits::ZERO)
    }
}

/// A monthly percentage on the outstanding base after a grace period
///
/// Each started 30-day period past the grace window counts as one month.
/// Amounts are rounded half-to-even to whole minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyPenaltyPolicy {
    pub grace_days: u32,
    pub monthly_rate: Rate,
    /// Charge penalty on previously accrued penalty as well
    #[serde(default)]
    pub compounding: bool,
}

impl MonthlyPenaltyPolicy {
    pub fn new(grace_days: u32, monthly_rate: Rate) -> Self {
        Self {
            grace_days,
            monthly_rate,
            compounding: false,
        }
    }

    pub fn compounding(mut self) -> Self {
        self.compounding = true;
        self
    }

    /// Number of penalty months accrued by `as_of`
    pub fn months_late(&self, due_date: NaiveDate, as_of: NaiveDate) -> u32 {
        let grace_end = due_date + Duration::days(i64::from(self.grace_days));
        let days_late = (as_of - grace_end).num_days();
        if days_late <= 0 {
            return 0;
        }
        let months = (days_late + DAYS_PER_PENALTY_MONTH - 1) / DAYS_PER_PENALTY_MONTH;
        u32::try_from(months).unwrap_or(u32::MAX)
    }
}

impl PenaltyCalculator for MonthlyPenaltyPolicy {
    fn penalty_as_of(
        &self,
        base_outstanding: MinorUnits,
        due_date: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<MinorUnits, MoneyError> {
        if !base_outstanding.is_positive() {
            return Ok(MinorUnits::ZERO);
        }
        let months = self.months_late(due_date, as_of);
        if months == 0 {
            return Ok(MinorUnits::ZERO);
        }

        let base = Decimal::from(base_outstanding.value());
        let rate = self.monthly_rate.as_decimal();
        let penalty = if self.compounding {
            let mut factor = Decimal::ONE;
            for _ in 0..months {
                factor = factor
                    .checked_mul(Decimal::ONE + rate)
                    .ok_or(MoneyError::Overflow)?;
            }
            base.checked_mul(factor - Decimal::ONE)
        } else {
            base.checked_mul(rate)
                .and_then(|p| p.checked_mul(Decimal::from(months)))
        }
        .ok_or(MoneyError::Overflow)?;

        MinorUnits::from_decimal_minor_rounded(penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_no_penalty_within_grace() {
        let policy = MonthlyPenaltyPolicy::new(10, Rate::from_percentage(dec!(5)));
        let penalty = policy
            .penalty_as_of(MinorUnits::new(100_000), date(2026, 6, 1), date(2026, 6, 11))
            .unwrap();
        assert_eq!(penalty, MinorUnits::ZERO);
    }

    #[test]
    fn test_simple_penalty_per_started_month() {
        let policy = MonthlyPenaltyPolicy::new(0, Rate::from_percentage(dec!(5)));

        let one_month = policy
            .penalty_as_of(MinorUnits::new(100_000), date(2026, 6, 1), date(2026, 6, 2))
            .unwrap();
        assert_eq!(one_month, MinorUnits::new(5_000));

        let two_months = policy
            .penalty_as_of(MinorUnits::new(100_000), date(2026, 6, 1), date(2026, 7, 2))
            .unwrap();
        assert_eq!(two_months, MinorUnits::new(10_000));
    }

    #[test]
    fn test_compounding_penalty() {
        let policy = MonthlyPenaltyPolicy::new(0, Rate::from_percentage(dec!(10))).compounding();
        // 61 days late = 3 started months: 1000 * (1.1^3 - 1) = 331
        let penalty = policy
            .penalty_as_of(MinorUnits::new(1_000), date(2026, 1, 1), date(2026, 3, 3))
            .unwrap();
        assert_eq!(penalty, MinorUnits::new(331));
    }

    #[test]
    fn test_penalty_rounds_half_to_even() {
        let policy = MonthlyPenaltyPolicy::new(0, Rate::from_percentage(dec!(2.5)));
        // 1100 * 0.025 = 27.5 -> 28; 1300 * 0.025 = 32.5 -> 32
        let a = policy
            .penalty_as_of(MinorUnits::new(1_100), date(2026, 1, 1), date(2026, 1, 5))
            .unwrap();
        let b = policy
            .penalty_as_of(MinorUnits::new(1_300), date(2026, 1, 1), date(2026, 1, 5))
            .unwrap();
        assert_eq!(a, MinorUnits::new(28));
        assert_eq!(b, MinorUnits::new(32));
    }

    #[test]
    fn test_no_penalty_policy() {
        let penalty = NoPenalty
            .penalty_as_of(MinorUnits::new(1_000), date(2025, 1, 1), date(2026, 1, 1))
            .unwrap();
        assert!(penalty.is_zero());
    }
}
