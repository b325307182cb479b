//! The unified preview returned to callers and handed back on commit
//!
//! A preview carries no timestamps or generated identifiers, so the same
//! inputs always serialize to the same JSON.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{MinorUnits, UnitRef};
use crate::bill::{BillStatus, ModuleType};
use crate::classifier::PriorityRank;
use crate::error::DistributionError;

/// Whether the preview describes a real payment or a statement of everything payable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    /// A concrete incoming payment; committable
    Payment,
    /// No amount was given; every payable bill is shown as settled and the
    /// incoming payment is the amount that would settle them after credit.
    /// Statements are read-only.
    Statement,
}

/// The money available to a distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsEnvelope {
    pub incoming_payment: MinorUnits,
    pub existing_credit: MinorUnits,
}

impl FundsEnvelope {
    /// Creates an envelope, rejecting negative amounts
    pub fn new(
        incoming_payment: MinorUnits,
        existing_credit: MinorUnits,
    ) -> Result<Self, DistributionError> {
        if incoming_payment.is_negative() {
            return Err(DistributionError::validation(format!(
                "payment amount cannot be negative: {}",
                incoming_payment
            )));
        }
        if existing_credit.is_negative() {
            return Err(DistributionError::invariant(format!(
                "credit balance is negative: {}",
                existing_credit
            )));
        }
        Ok(Self {
            incoming_payment,
            existing_credit,
        })
    }

    /// Incoming payment plus existing credit
    pub fn total(&self) -> Result<MinorUnits, DistributionError> {
        Ok(self.incoming_payment.checked_add(self.existing_credit)?)
    }
}

/// How the unit's credit balance moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSummary {
    pub starting_balance: MinorUnits,
    /// Existing credit consumed by the allocation
    pub used: MinorUnits,
    /// Surplus turned into new credit
    pub added: MinorUnits,
    pub final_balance: MinorUnits,
}

impl CreditSummary {
    /// Derives used/added from the starting and final balances
    pub fn from_balances(starting_balance: MinorUnits, final_balance: MinorUnits) -> Self {
        if final_balance >= starting_balance {
            Self {
                starting_balance,
                used: MinorUnits::ZERO,
                added: final_balance.abs_diff(starting_balance),
                final_balance,
            }
        } else {
            Self {
                starting_balance,
                used: starting_balance.abs_diff(final_balance),
                added: MinorUnits::ZERO,
                final_balance,
            }
        }
    }

    /// True when `starting - used + added == final` and at most one side moved
    pub fn is_consistent(&self) -> bool {
        let moved_both_ways = self.used.is_positive() && self.added.is_positive();
        let reconciles = self
            .starting_balance
            .checked_sub(self.used)
            .and_then(|b| b.checked_add(self.added))
            .map(|b| b == self.final_balance)
            .unwrap_or(false);
        reconciles && !moved_both_ways && !self.final_balance.is_negative()
    }
}

/// One bill's share of the payment, keyed by its module-local period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleBillPayment {
    pub period: String,
    pub due_date: NaiveDate,
    pub priority: PriorityRank,
    pub base_due: MinorUnits,
    pub penalty_due: MinorUnits,
    pub base_paid: MinorUnits,
    pub penalty_paid: MinorUnits,
    pub amount_paid: MinorUnits,
    pub new_status: BillStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything one module receives from a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAllocation {
    pub module: ModuleType,
    pub bills: Vec<ModuleBillPayment>,
    pub total_paid: MinorUnits,
    pub base_paid: MinorUnits,
    pub penalty_paid: MinorUnits,
}

impl ModuleAllocation {
    pub fn empty(module: ModuleType) -> Self {
        Self {
            module,
            bills: Vec::new(),
            total_paid: MinorUnits::ZERO,
            base_paid: MinorUnits::ZERO,
            penalty_paid: MinorUnits::ZERO,
        }
    }

    /// Appends a bill payment and updates the running totals
    pub fn push(&mut self, payment: ModuleBillPayment) -> Result<(), DistributionError> {
        self.total_paid = self.total_paid.checked_add(payment.amount_paid)?;
        self.base_paid = self.base_paid.checked_add(payment.base_paid)?;
        self.penalty_paid = self.penalty_paid.checked_add(payment.penalty_paid)?;
        self.bills.push(payment);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.bills.is_empty()
    }

    pub fn find(&self, period: &str) -> Option<&ModuleBillPayment> {
        self.bills.iter().find(|b| b.period == period)
    }
}

/// Aggregate amounts across both modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewTotals {
    /// Incoming payment plus existing credit
    pub total_available: MinorUnits,
    pub total_allocated: MinorUnits,
    pub total_base_paid: MinorUnits,
    pub total_penalty_paid: MinorUnits,
    /// Payable balance across ranked bills before the payment
    pub total_outstanding_before: MinorUnits,
    /// Payable balance across ranked bills after the payment
    pub total_outstanding_after: MinorUnits,
}

/// The full outcome of distributing a payment across both modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedPreview {
    pub unit: UnitRef,
    pub as_of_date: NaiveDate,
    pub mode: PreviewMode,
    pub funds: FundsEnvelope,
    pub totals: PreviewTotals,
    pub dues: ModuleAllocation,
    pub utility: ModuleAllocation,
    pub credit: CreditSummary,
    /// Bills that were classified into a tier
    pub bills_considered: usize,
    /// Future utility bills left out of the distribution
    pub bills_excluded: usize,
    /// Modules whose bill source failed; their bills are absent from this preview
    #[serde(default)]
    pub degraded_modules: Vec<ModuleType>,
}

impl UnifiedPreview {
    pub fn module(&self, module: ModuleType) -> &ModuleAllocation {
        match module {
            ModuleType::Dues => &self.dues,
            ModuleType::Utility => &self.utility,
        }
    }

    /// Every (module, period, amount) triple with a non-zero payment, in module order
    pub fn allocation_lines(&self) -> Vec<(ModuleType, &str, MinorUnits)> {
        ModuleType::ALL
            .iter()
            .flat_map(|m| {
                self.module(*m)
                    .bills
                    .iter()
                    .map(move |b| (*m, b.period.as_str(), b.amount_paid))
            })
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_modules.is_empty()
    }

    /// Restates an unbounded distribution as a statement
    ///
    /// The incoming payment becomes what is still owed after existing credit,
    /// and the credit summary is rebuilt from it, so conservation holds on
    /// the figures the client sees.
    pub fn into_statement(mut self) -> Result<Self, DistributionError> {
        let allocated = self.totals.total_allocated;
        let credit = self.funds.existing_credit;
        let incoming = allocated.checked_sub(credit)?.max(MinorUnits::ZERO);
        let final_balance = credit.checked_add(incoming)?.checked_sub(allocated)?;

        self.funds = FundsEnvelope::new(incoming, credit)?;
        self.totals.total_available = self.funds.total()?;
        self.credit = CreditSummary::from_balances(credit, final_balance);
        self.mode = PreviewMode::Statement;
        Ok(self)
    }

    /// Only previews of a concrete payment may be committed
    pub fn is_committable(&self) -> bool {
        self.mode == PreviewMode::Payment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funds_envelope_rejects_negative_payment() {
        let result = FundsEnvelope::new(MinorUnits::new(-100), MinorUnits::ZERO);
        assert!(matches!(result, Err(DistributionError::Validation(_))));
    }

    #[test]
    fn test_credit_summary_records_usage() {
        let summary = CreditSummary::from_balances(MinorUnits::new(2000), MinorUnits::new(500));
        assert_eq!(summary.used, MinorUnits::new(1500));
        assert_eq!(summary.added, MinorUnits::ZERO);
        assert!(summary.is_consistent());
    }

    #[test]
    fn test_credit_summary_records_surplus() {
        let summary = CreditSummary::from_balances(MinorUnits::new(100), MinorUnits::new(600));
        assert_eq!(summary.used, MinorUnits::ZERO);
        assert_eq!(summary.added, MinorUnits::new(500));
        assert!(summary.is_consistent());
    }

    #[test]
    fn test_credit_summary_rejects_movement_both_ways() {
        let summary = CreditSummary {
            starting_balance: MinorUnits::new(100),
            used: MinorUnits::new(50),
            added: MinorUnits::new(50),
            final_balance: MinorUnits::new(100),
        };
        assert!(!summary.is_consistent());
    }

    #[test]
    fn test_module_allocation_push_accumulates() {
        let mut allocation = ModuleAllocation::empty(ModuleType::Utility);
        allocation
            .push(ModuleBillPayment {
                period: "2026-00".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
                priority: PriorityRank::PastDueUtility,
                base_due: MinorUnits::new(3000),
                penalty_due: MinorUnits::new(300),
                base_paid: MinorUnits::new(3000),
                penalty_paid: MinorUnits::new(100),
                amount_paid: MinorUnits::new(3100),
                new_status: BillStatus::Partial,
                description: None,
            })
            .unwrap();

        assert_eq!(allocation.total_paid, MinorUnits::new(3100));
        assert_eq!(allocation.penalty_paid, MinorUnits::new(100));
        assert!(allocation.find("2026-00").is_some());
        assert!(allocation.find("2026-01").is_none());
    }
}
