//! Priority classification
//!
//! Every fetched bill lands in exactly one of five priority tiers, or is
//! excluded from the distribution altogether:
//!
//! | Rank | Module  | Timing                          |
//! |------|---------|---------------------------------|
//! | 1    | Dues    | past due                        |
//! | 2    | Utility | past due                        |
//! | 3    | Dues    | due in the current fiscal month |
//! | 4    | Utility | due in the current fiscal month |
//! | 5    | Dues    | future (prepayment)             |
//! | -    | Utility | future, never payable           |
//!
//! A bill is past due only when its due date is strictly before the as-of
//! date. A bill due on the as-of date is current.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::FiscalYearStart;
use crate::bill::{Bill, ModuleType, NamespacedPeriod};

/// Allocation priority, lower ranks are paid first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityRank {
    PastDueDues = 1,
    PastDueUtility = 2,
    CurrentDues = 3,
    CurrentUtility = 4,
    PrepaidDues = 5,
}

impl PriorityRank {
    /// All tiers in payment order
    pub const ALL: [PriorityRank; 5] = [
        PriorityRank::PastDueDues,
        PriorityRank::PastDueUtility,
        PriorityRank::CurrentDues,
        PriorityRank::CurrentUtility,
        PriorityRank::PrepaidDues,
    ];

    /// Numeric rank, 1 through 5
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for PriorityRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.value())
    }
}

/// When a bill falls due relative to the as-of date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueTiming {
    PastDue,
    CurrentFiscalMonth,
    Future,
}

impl DueTiming {
    pub fn of(due_date: NaiveDate, as_of: NaiveDate, fiscal_year_start: FiscalYearStart) -> Self {
        if due_date < as_of {
            DueTiming::PastDue
        } else if fiscal_year_start.same_fiscal_month(due_date, as_of) {
            DueTiming::CurrentFiscalMonth
        } else {
            DueTiming::Future
        }
    }
}

/// Outcome of classifying one bill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ranked(PriorityRank),
    /// Not payable on this date; receives nothing
    Excluded,
}

/// Assigns a bill to its priority tier
///
/// # Arguments
///
/// * `bill` - The bill to classify
/// * `as_of` - The date the payment is applied
/// * `fiscal_year_start` - The client's fiscal year start, which decides the current fiscal month
pub fn classify(bill: &Bill, as_of: NaiveDate, fiscal_year_start: FiscalYearStart) -> Classification {
    let timing = DueTiming::of(bill.due_date, as_of, fiscal_year_start);
    let rank = match (bill.module, timing) {
        (ModuleType::Dues, DueTiming::PastDue) => PriorityRank::PastDueDues,
        (ModuleType::Utility, DueTiming::PastDue) => PriorityRank::PastDueUtility,
        (ModuleType::Dues, DueTiming::CurrentFiscalMonth) => PriorityRank::CurrentDues,
        (ModuleType::Utility, DueTiming::CurrentFiscalMonth) => PriorityRank::CurrentUtility,
        (ModuleType::Dues, DueTiming::Future) => PriorityRank::PrepaidDues,
        (ModuleType::Utility, DueTiming::Future) => return Classification::Excluded,
    };
    Classification::Ranked(rank)
}

/// A bill with its tier and cross-module key attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedBill {
    pub key: NamespacedPeriod,
    pub rank: PriorityRank,
    pub bill: Bill,
}

impl RankedBill {
    pub fn new(bill: Bill, rank: PriorityRank) -> Self {
        Self {
            key: bill.namespaced_period(),
            rank,
            bill,
        }
    }
}

/// Classifies bills and returns the payable ones in allocation order
///
/// Ordering is by rank, then due date (oldest first), then by namespaced period
/// so that bills sharing a rank and due date have a stable order. Excluded bills
/// are returned separately.
pub fn rank_bills(
    bills: Vec<Bill>,
    as_of: NaiveDate,
    fiscal_year_start: FiscalYearStart,
) -> (Vec<RankedBill>, Vec<Bill>) {
    let mut ranked = Vec::with_capacity(bills.len());
    let mut excluded = Vec::new();

    for bill in bills {
        match classify(&bill, as_of, fiscal_year_start) {
            Classification::Ranked(rank) => ranked.push(RankedBill::new(bill, rank)),
            Classification::Excluded => excluded.push(bill),
        }
    }

    ranked.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| a.bill.due_date.cmp(&b.bill.due_date))
            .then_with(|| a.key.cmp(&b.key))
    });

    (ranked, excluded)
}
