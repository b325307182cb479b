//! Property-Based Test Generators
//!
//! Provides proptest strategies for bills and funds that respect the shape a
//! bill source must deliver: non-negative amounts and one bill per period
//! within a module.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use core_kernel::{FiscalYearStart, MinorUnits};
use domain_billing::{Bill, ModuleType};

use crate::fixtures::DateFixtures;

/// Strategy for a billing module
pub fn module_strategy() -> impl Strategy<Value = ModuleType> {
    prop_oneof![Just(ModuleType::Dues), Just(ModuleType::Utility)]
}

/// Strategy for a non-negative amount up to 100,000.00
pub fn amount_strategy() -> impl Strategy<Value = MinorUnits> {
    (0i64..10_000_000i64).prop_map(MinorUnits::new)
}

/// Strategy for a fiscal year start month
pub fn fiscal_year_start_strategy() -> impl Strategy<Value = FiscalYearStart> {
    (1u32..=12u32).prop_map(|m| FiscalYearStart::new(m).expect("month in range"))
}

/// Strategy for a due date within a year either side of the as-of date
pub fn due_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (-365i64..=365i64).prop_map(|offset| DateFixtures::as_of() + Duration::days(offset))
}

/// Strategy for one bill with a placeholder period
pub fn bill_strategy() -> impl Strategy<Value = Bill> {
    (
        module_strategy(),
        due_date_strategy(),
        1i64..1_000_000i64,
        prop_oneof![Just(0i64), 0i64..100_000i64],
    )
        .prop_map(|(module, due, base, penalty)| {
            Bill::new(module, "placeholder", due, MinorUnits::new(base))
                .with_penalty(MinorUnits::new(penalty))
        })
}

/// Strategy for a set of bills with unique periods per module
///
/// Period keys are assigned by position and repeat across modules, so the
/// cross-module namespace is always exercised.
pub fn bills_strategy(max: usize) -> impl Strategy<Value = Vec<Bill>> {
    prop::collection::vec(bill_strategy(), 0..=max).prop_map(|bills| {
        let mut dues = 0usize;
        let mut utility = 0usize;
        bills
            .into_iter()
            .map(|mut bill| {
                let counter = match bill.module {
                    ModuleType::Dues => &mut dues,
                    ModuleType::Utility => &mut utility,
                };
                bill.period = format!("P{:03}", *counter);
                *counter += 1;
                bill
            })
            .collect()
    })
}
