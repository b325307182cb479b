//! Splitting a cross-module allocation back into per-module results

use std::collections::BTreeMap;
use tracing::warn;

use crate::allocator::AllocationResult;
use crate::bill::{ModuleType, NamespacedPeriod};
use crate::classifier::RankedBill;
use crate::error::DistributionError;
use crate::preview::{CreditSummary, ModuleAllocation, ModuleBillPayment};

/// Ranked bills keyed by namespaced period
#[derive(Debug, Clone, Default)]
pub struct BillIndex {
    bills: BTreeMap<NamespacedPeriod, RankedBill>,
}

impl BillIndex {
    /// Indexes the bills, failing on a duplicated namespaced period
    pub fn build(bills: &[RankedBill]) -> Result<Self, DistributionError> {
        let mut index = BTreeMap::new();
        for ranked in bills {
            if index.insert(ranked.key.clone(), ranked.clone()).is_some() {
                return Err(DistributionError::invariant(format!(
                    "duplicate bill period {}",
                    ranked.key
                )));
            }
        }
        Ok(Self { bills: index })
    }

    pub fn get(&self, period: &NamespacedPeriod) -> Option<&RankedBill> {
        self.bills.get(period)
    }

    pub fn len(&self) -> usize {
        self.bills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bills.is_empty()
    }
}

/// Per-module allocations plus the credit movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSplit {
    pub dues: ModuleAllocation,
    pub utility: ModuleAllocation,
    pub credit: CreditSummary,
}

/// Routes each non-zero allocation to its module with the namespace stripped
///
/// An allocation whose period is not in the index is logged and skipped; it
/// cannot be attributed to a bill.
pub fn split(
    results: &[AllocationResult],
    index: &BillIndex,
    credit: CreditSummary,
) -> Result<ModuleSplit, DistributionError> {
    let mut dues = ModuleAllocation::empty(ModuleType::Dues);
    let mut utility = ModuleAllocation::empty(ModuleType::Utility);

    for result in results.iter().filter(|r| r.amount_paid.is_positive()) {
        let Some(ranked) = index.get(&result.period) else {
            warn!(period = %result.period, amount = %result.amount_paid, "Allocation has no matching bill, skipping");
            continue;
        };

        let payment = ModuleBillPayment {
            period: result.period.local_period().to_string(),
            due_date: ranked.bill.due_date,
            priority: ranked.rank,
            base_due: ranked.bill.base_amount_due,
            penalty_due: ranked.bill.penalty_amount_due,
            base_paid: result.base_paid,
            penalty_paid: result.penalty_paid,
            amount_paid: result.amount_paid,
            new_status: result.new_status,
            description: ranked.bill.description.clone(),
        };

        match result.period.module() {
            ModuleType::Dues => dues.push(payment)?,
            ModuleType::Utility => utility.push(payment)?,
        }
    }

    Ok(ModuleSplit {
        dues,
        utility,
        credit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_kernel::MinorUnits;
    use crate::bill::{Bill, BillStatus};
    use crate::classifier::PriorityRank;

    fn ranked(module: ModuleType, period: &str, base: i64) -> RankedBill {
        let due = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let rank = match module {
            ModuleType::Dues => PriorityRank::PastDueDues,
            ModuleType::Utility => PriorityRank::PastDueUtility,
        };
        RankedBill::new(Bill::new(module, period, due, MinorUnits::new(base)), rank)
    }

    fn paid(module: ModuleType, period: &str, amount: i64) -> AllocationResult {
        AllocationResult {
            period: NamespacedPeriod::new(module, period),
            amount_paid: MinorUnits::new(amount),
            base_paid: MinorUnits::new(amount),
            penalty_paid: MinorUnits::ZERO,
            new_status: BillStatus::Paid,
        }
    }

    #[test]
    fn test_split_routes_same_period_to_both_modules() {
        let bills = vec![
            ranked(ModuleType::Dues, "2026-00", 5000),
            ranked(ModuleType::Utility, "2026-00", 3000),
        ];
        let index = BillIndex::build(&bills).unwrap();
        let results = vec![
            paid(ModuleType::Dues, "2026-00", 5000),
            paid(ModuleType::Utility, "2026-00", 3000),
        ];
        let credit = CreditSummary::from_balances(MinorUnits::ZERO, MinorUnits::ZERO);

        let split = split(&results, &index, credit).unwrap();

        assert_eq!(split.dues.bills.len(), 1);
        assert_eq!(split.dues.bills[0].period, "2026-00");
        assert_eq!(split.utility.bills.len(), 1);
        assert_eq!(split.utility.total_paid, MinorUnits::new(3000));
    }

    #[test]
    fn test_split_drops_zero_allocations() {
        let bills = vec![ranked(ModuleType::Dues, "2026-00", 5000)];
        let index = BillIndex::build(&bills).unwrap();
        let results = vec![paid(ModuleType::Dues, "2026-00", 0)];
        let credit = CreditSummary::from_balances(MinorUnits::ZERO, MinorUnits::ZERO);

        let split = split(&results, &index, credit).unwrap();
        assert!(split.dues.is_empty());
    }

    #[test]
    fn test_split_skips_unknown_period() {
        let index = BillIndex::build(&[]).unwrap();
        let results = vec![paid(ModuleType::Utility, "2030-00", 100)];
        let credit = CreditSummary::from_balances(MinorUnits::ZERO, MinorUnits::ZERO);

        let split = split(&results, &index, credit).unwrap();
        assert!(split.utility.is_empty());
    }

    #[test]
    fn test_index_rejects_duplicate_period() {
        let bills = vec![
            ranked(ModuleType::Dues, "2026-00", 100),
            ranked(ModuleType::Dues, "2026-00", 200),
        ];
        assert!(matches!(
            BillIndex::build(&bills),
            Err(DistributionError::InvariantViolation(_))
        ));
    }
}
