//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for units, dates and bills. These fixtures
//! are consistent and predictable: the reference date is 2026-07-15 and the
//! reference client's fiscal year starts in July.

use chrono::NaiveDate;
use core_kernel::{ClientId, FiscalYearStart, MinorUnits, UnitId, UnitRef};
use domain_billing::{Bill, ModuleType};

/// Fixture for units and clients
pub struct UnitFixtures;

impl UnitFixtures {
    /// The reference HOA client
    pub fn client() -> ClientId {
        ClientId::new("ACME-HOA").expect("valid client code")
    }

    /// Unit 101 of the reference client
    pub fn unit() -> UnitRef {
        UnitRef::new(Self::client(), UnitId::new("101").expect("valid unit code"))
    }

    /// Another unit of the reference client
    pub fn neighbour() -> UnitRef {
        UnitRef::new(Self::client(), UnitId::new("102").expect("valid unit code"))
    }

    /// A unit that is never registered
    pub fn unknown() -> UnitRef {
        UnitRef::new(Self::client(), UnitId::new("999").expect("valid unit code"))
    }
}

/// Fixture for dates and the fiscal calendar
pub struct DateFixtures;

impl DateFixtures {
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
    }

    /// The as-of date used throughout the suite
    pub fn as_of() -> NaiveDate {
        Self::date(2026, 7, 15)
    }

    /// Fiscal year starting in July
    pub fn fiscal_year_start() -> FiscalYearStart {
        FiscalYearStart::new(7).expect("valid month")
    }

    /// A date in the month before the as-of date
    pub fn last_month() -> NaiveDate {
        Self::date(2026, 6, 1)
    }

    /// A later day in the as-of month
    pub fn later_this_month() -> NaiveDate {
        Self::date(2026, 7, 28)
    }

    /// A date in the month after the as-of date
    pub fn next_month() -> NaiveDate {
        Self::date(2026, 8, 1)
    }
}

/// Fixture for common bills, relative to [`DateFixtures::as_of`]
pub struct BillFixtures;

impl BillFixtures {
    /// Past-due dues of 4500 base + 500 penalty
    pub fn past_due_dues() -> Bill {
        Bill::new(ModuleType::Dues, "2025-11", DateFixtures::last_month(), MinorUnits::new(4_500))
            .with_penalty(MinorUnits::new(500))
            .with_description("Maintenance fee June")
    }

    /// Past-due water of 3000 base + 300 penalty
    pub fn past_due_utility() -> Bill {
        Bill::new(ModuleType::Utility, "2025-11", DateFixtures::last_month(), MinorUnits::new(3_000))
            .with_penalty(MinorUnits::new(300))
            .with_description("Water consumption May")
    }

    /// Dues of 5000 due later this month
    pub fn current_dues() -> Bill {
        Bill::new(ModuleType::Dues, "2026-00", DateFixtures::later_this_month(), MinorUnits::new(5_000))
    }

    /// Water of 2500 due later this month
    pub fn current_utility() -> Bill {
        Bill::new(ModuleType::Utility, "2026-00", DateFixtures::later_this_month(), MinorUnits::new(2_500))
    }

    /// Dues of 5000 due next month
    pub fn future_dues() -> Bill {
        Bill::new(ModuleType::Dues, "2026-01", DateFixtures::next_month(), MinorUnits::new(5_000))
    }

    /// Water of 2500 billed for next month
    pub fn future_utility() -> Bill {
        Bill::new(ModuleType::Utility, "2026-01", DateFixtures::next_month(), MinorUnits::new(2_500))
    }
}
