//! The persisted record of a committed payment
//!
//! One [`PaymentTransaction`] references the work done in both modules and the
//! credit ledger, and is written in a single atomic step.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{MinorUnits, TransactionId, UnitRef};
use crate::bill::{BillStatus, ModuleType};
use crate::error::DistributionError;
use crate::ledger::CreditLedgerEntry;
use crate::payment::PaymentMetadata;
use crate::preview::{ModuleAllocation, UnifiedPreview};

/// A payment applied to one bill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPaymentLine {
    pub period: String,
    pub base_paid: MinorUnits,
    pub penalty_paid: MinorUnits,
    pub amount_paid: MinorUnits,
    pub new_status: BillStatus,
}

/// The bill updates one module must apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCommit {
    pub module: ModuleType,
    pub lines: Vec<BillPaymentLine>,
    pub total_paid: MinorUnits,
}

impl ModuleCommit {
    fn from_allocation(allocation: &ModuleAllocation) -> Self {
        Self {
            module: allocation.module,
            lines: allocation
                .bills
                .iter()
                .map(|b| BillPaymentLine {
                    period: b.period.clone(),
                    base_paid: b.base_paid,
                    penalty_paid: b.penalty_paid,
                    amount_paid: b.amount_paid,
                    new_status: b.new_status,
                })
                .collect(),
            total_paid: allocation.total_paid,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Everything a commit writes, under one transaction id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    pub unit: UnitRef,
    pub as_of_date: NaiveDate,
    pub payment: PaymentMetadata,
    pub incoming_payment: MinorUnits,
    pub total_allocated: MinorUnits,
    pub dues: ModuleCommit,
    pub utility: ModuleCommit,
    pub credit_entry: CreditLedgerEntry,
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Builds the transaction from a verified preview
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a statement-mode preview, which describes no
    /// real payment.
    pub fn from_preview(
        preview: &UnifiedPreview,
        payment: PaymentMetadata,
    ) -> Result<Self, DistributionError> {
        if !preview.is_committable() {
            return Err(DistributionError::validation(
                "a statement preview cannot be committed; preview with a payment amount",
            ));
        }

        let id = TransactionId::new_v7();
        let credit_entry = CreditLedgerEntry::from_summary(id, &preview.credit)?;

        Ok(Self {
            id,
            unit: preview.unit.clone(),
            as_of_date: preview.as_of_date,
            payment,
            incoming_payment: preview.funds.incoming_payment,
            total_allocated: preview.totals.total_allocated,
            dues: ModuleCommit::from_allocation(&preview.dues),
            utility: ModuleCommit::from_allocation(&preview.utility),
            credit_entry,
            created_at: Utc::now(),
        })
    }

    pub fn module(&self, module: ModuleType) -> &ModuleCommit {
        match module {
            ModuleType::Dues => &self.dues,
            ModuleType::Utility => &self.utility,
        }
    }

    pub fn bills_updated(&self) -> usize {
        self.dues.lines.len() + self.utility.lines.len()
    }
}
