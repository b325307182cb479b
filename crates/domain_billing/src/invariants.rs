//! Post-allocation checks
//!
//! These run on every distribution before a preview is returned. A failure is
//! an engine bug, reported as `InvariantViolation`.

use tracing::error;

use core_kernel::MinorUnits;
use crate::allocator::AllocationResult;
use crate::bill::BillStatus;
use crate::classifier::RankedBill;
use crate::error::DistributionError;
use crate::preview::CreditSummary;

fn violation(message: String) -> DistributionError {
    error!(%message, "Distribution invariant violated");
    DistributionError::InvariantViolation(message)
}

/// Checks each result against its bill and the ordering between results
///
/// `bills` and `results` must be parallel, in allocation order.
pub fn verify_allocations(
    bills: &[RankedBill],
    results: &[AllocationResult],
) -> Result<(), DistributionError> {
    if bills.len() != results.len() {
        return Err(violation(format!(
            "{} allocation results for {} bills",
            results.len(),
            bills.len()
        )));
    }

    let mut funds_exhausted = false;
    for (ranked, result) in bills.iter().zip(results) {
        let bill = &ranked.bill;
        if result.period != ranked.key {
            return Err(violation(format!(
                "result for {} is out of order, expected {}",
                result.period, ranked.key
            )));
        }
        if result.base_paid.is_negative() || result.penalty_paid.is_negative() {
            return Err(violation(format!("negative payment on {}", ranked.key)));
        }
        if result.base_paid > bill.base_amount_due || result.penalty_paid > bill.penalty_amount_due {
            return Err(violation(format!("overpayment on {}", ranked.key)));
        }
        if result.base_paid.checked_add(result.penalty_paid)? != result.amount_paid {
            return Err(violation(format!(
                "base and penalty do not sum to amount paid on {}",
                ranked.key
            )));
        }
        if result.penalty_paid.is_positive() && result.base_paid != bill.base_amount_due {
            return Err(violation(format!(
                "penalty paid before base settled on {}",
                ranked.key
            )));
        }
        if funds_exhausted && result.amount_paid.is_positive() {
            return Err(violation(format!(
                "{} was paid after an earlier bill was left open",
                ranked.key
            )));
        }
        if result.new_status != BillStatus::Paid {
            funds_exhausted = true;
        }
    }

    Ok(())
}

/// Checks that every unit of available money is either allocated or kept as credit
pub fn verify_conservation(
    total_available: MinorUnits,
    total_allocated: MinorUnits,
    credit: &CreditSummary,
) -> Result<(), DistributionError> {
    let accounted = total_allocated.checked_add(credit.final_balance)?;
    if accounted != total_available {
        return Err(violation(format!(
            "available {} but allocated {} plus credit {}",
            total_available, total_allocated, credit.final_balance
        )));
    }
    if !credit.is_consistent() {
        return Err(violation(format!(
            "credit summary does not reconcile: {:?}",
            credit
        )));
    }
    Ok(())
}
