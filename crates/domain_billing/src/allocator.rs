//! Priority-tier allocation
//!
//! Funds are applied to bills strictly in the order given. Within a bill the
//! base charge is settled before the penalty, and a bill is finished before
//! the next one receives anything. The only bill that can end partially paid
//! is the one where the funds run out.

use serde::{Deserialize, Serialize};

use core_kernel::MinorUnits;
use crate::bill::{BillStatus, NamespacedPeriod};
use crate::classifier::RankedBill;
use crate::error::DistributionError;

/// What one bill receives from an allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub period: NamespacedPeriod,
    pub amount_paid: MinorUnits,
    pub base_paid: MinorUnits,
    pub penalty_paid: MinorUnits,
    pub new_status: BillStatus,
}

/// Allocation results for a run of bills plus the funds left over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAllocation {
    /// One result per input bill, in input order, zero-paid bills included
    pub results: Vec<AllocationResult>,
    pub leftover: MinorUnits,
}

impl TierAllocation {
    pub fn total_paid(&self) -> Result<MinorUnits, DistributionError> {
        Ok(MinorUnits::checked_sum(self.results.iter().map(|r| r.amount_paid))?)
    }
}

/// Allocates `funds` across `bills` in order
///
/// # Arguments
///
/// * `bills` - Bills already sorted into payment order
/// * `funds` - Non-negative amount available
///
/// # Errors
///
/// Returns `InvariantViolation` if `funds` is negative or a bill carries a
/// negative amount, and `Money` on arithmetic overflow.
pub fn allocate_tier(
    bills: &[RankedBill],
    funds: MinorUnits,
) -> Result<TierAllocation, DistributionError> {
    if funds.is_negative() {
        return Err(DistributionError::invariant(format!(
            "cannot allocate negative funds {}",
            funds
        )));
    }

    let mut remaining = funds;
    let mut results = Vec::with_capacity(bills.len());

    for ranked in bills {
        let bill = &ranked.bill;
        if bill.base_amount_due.is_negative() || bill.penalty_amount_due.is_negative() {
            return Err(DistributionError::invariant(format!(
                "bill {} reached allocation with a negative amount",
                ranked.key
            )));
        }

        let base_paid = remaining.min(bill.base_amount_due);
        remaining = remaining.checked_sub(base_paid)?;

        let penalty_paid = remaining.min(bill.penalty_amount_due);
        remaining = remaining.checked_sub(penalty_paid)?;

        let amount_paid = base_paid.checked_add(penalty_paid)?;
        let new_status = BillStatus::from_amounts(amount_paid, bill.total_due()?);

        results.push(AllocationResult {
            period: ranked.key.clone(),
            amount_paid,
            base_paid,
            penalty_paid,
            new_status,
        });
    }

    Ok(TierAllocation {
        results,
        leftover: remaining,
    })
}
