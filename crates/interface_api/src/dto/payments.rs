//! Payment DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, MinorUnits, TransactionId};
use domain_billing::{CommitResult, CommitState, PaymentMetadata, UnifiedPreview};

/// Body of a preview request
///
/// A missing or null `amount` asks for a statement of everything owed.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PreviewRequest {
    /// Payment in major units, e.g. `"1500.00"`
    pub amount: Option<Decimal>,
    /// Date the bills are evaluated at; today in the client timezone if absent
    pub as_of_date: Option<NaiveDate>,
}

/// Body of a commit request
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    /// The preview the caller accepted, exactly as returned
    pub preview: UnifiedPreview,
    pub payment: PaymentMetadata,
}

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub transaction_id: TransactionId,
    pub state: CommitState,
    pub state_history: Vec<CommitState>,
    pub bills_updated: usize,
    pub credit_balance: MinorUnits,
    /// Credit balance in major units of the configured currency
    pub credit_balance_major: Decimal,
    pub currency: Currency,
    pub committed_at: DateTime<Utc>,
    pub preview: UnifiedPreview,
}

impl CommitResponse {
    pub fn new(result: CommitResult, currency: Currency) -> Self {
        Self {
            transaction_id: result.transaction_id,
            state: result.state,
            state_history: result.state_history,
            bills_updated: result.receipt.bills_updated,
            credit_balance: result.receipt.credit_balance,
            credit_balance_major: result.receipt.credit_balance.to_major(currency),
            currency,
            committed_at: result.receipt.committed_at,
            preview: result.preview,
        }
    }
}
