//! Payment details captured at commit time

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DistributionError;

const MAX_NOTES_LEN: usize = 500;

/// How the money arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Bank transfer (SPEI or wire)
    BankTransfer,
    /// Cash at the administration office
    Cash,
    /// Check/cheque
    Check,
    /// Card terminal or online card payment
    Card,
    /// Deposit slip from a bank branch
    BankDeposit,
    /// No new money; only existing credit is applied
    CreditOnly,
}

impl PaymentMethod {
    /// Methods that must carry an external reference
    pub fn requires_reference(&self) -> bool {
        matches!(
            self,
            PaymentMethod::BankTransfer | PaymentMethod::Check | PaymentMethod::BankDeposit
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Check => "check",
            PaymentMethod::Card => "card",
            PaymentMethod::BankDeposit => "bank_deposit",
            PaymentMethod::CreditOnly => "credit_only",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who paid, how, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMetadata {
    pub method: PaymentMethod,
    /// External reference (bank reference, check number)
    #[serde(default)]
    pub reference: Option<String>,
    /// Date the money was received
    pub received_on: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PaymentMetadata {
    pub fn new(method: PaymentMethod, received_on: NaiveDate) -> Self {
        Self {
            method,
            reference: None,
            received_on,
            notes: None,
        }
    }

    /// Sets the external reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<(), DistributionError> {
        let has_reference = self
            .reference
            .as_deref()
            .map(|r| !r.trim().is_empty())
            .unwrap_or(false);
        if self.method.requires_reference() && !has_reference {
            return Err(DistributionError::validation(format!(
                "{} payments require a reference",
                self.method
            )));
        }
        if self.notes.as_ref().map(|n| n.len() > MAX_NOTES_LEN).unwrap_or(false) {
            return Err(DistributionError::validation(format!(
                "payment notes exceed {} characters",
                MAX_NOTES_LEN
            )));
        }
        Ok(())
    }
}
