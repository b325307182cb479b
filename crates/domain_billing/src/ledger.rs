//! Unit credit ledger
//!
//! Credit is money a unit has paid beyond what it owes. Every movement is
//! recorded as an entry carrying the balance before and after, so the running
//! balance can be replayed from the entries alone.
//!
//! # Invariants
//!
//! - The balance is never negative
//! - Each entry's previous balance equals the ledger balance when it is posted
//! - `new_balance == previous_balance - used + added`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{CreditLedgerEntryId, MinorUnits, TransactionId};
use crate::error::DistributionError;
use crate::preview::CreditSummary;

/// One movement of a unit's credit balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    pub id: CreditLedgerEntryId,
    pub transaction_id: TransactionId,
    pub previous_balance: MinorUnits,
    pub used: MinorUnits,
    pub added: MinorUnits,
    pub new_balance: MinorUnits,
    pub recorded_at: DateTime<Utc>,
}

impl CreditLedgerEntry {
    /// Creates the entry for a committed payment's credit movement
    pub fn from_summary(
        transaction_id: TransactionId,
        summary: &CreditSummary,
    ) -> Result<Self, DistributionError> {
        if !summary.is_consistent() {
            return Err(DistributionError::invariant(format!(
                "credit summary does not reconcile: {:?}",
                summary
            )));
        }
        Ok(Self {
            id: CreditLedgerEntryId::new_v7(),
            transaction_id,
            previous_balance: summary.starting_balance,
            used: summary.used,
            added: summary.added,
            new_balance: summary.final_balance,
            recorded_at: Utc::now(),
        })
    }

    /// True when the entry moves the balance
    pub fn has_movement(&self) -> bool {
        self.used.is_positive() || self.added.is_positive()
    }

    fn reconciles(&self) -> bool {
        self.previous_balance
            .checked_sub(self.used)
            .and_then(|b| b.checked_add(self.added))
            .map(|b| b == self.new_balance)
            .unwrap_or(false)
    }
}

/// A unit's running credit balance and its history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreditLedger {
    balance: MinorUnits,
    entries: Vec<CreditLedgerEntry>,
}

impl CreditLedger {
    /// Opens a ledger with a starting balance
    pub fn with_opening_balance(balance: MinorUnits) -> Self {
        Self {
            balance,
            entries: Vec::new(),
        }
    }

    pub fn balance(&self) -> MinorUnits {
        self.balance
    }

    pub fn entries(&self) -> &[CreditLedgerEntry] {
        &self.entries
    }

    /// Checks an entry against the current balance without posting it
    pub fn check(&self, entry: &CreditLedgerEntry) -> Result<(), DistributionError> {
        if entry.previous_balance != self.balance {
            return Err(DistributionError::CreditBalanceMismatch {
                expected: entry.previous_balance,
                actual: self.balance,
            });
        }
        if !entry.reconciles() || entry.new_balance.is_negative() {
            return Err(DistributionError::invariant(format!(
                "credit entry {} does not reconcile",
                entry.id
            )));
        }
        Ok(())
    }

    /// Posts an entry, moving the balance
    ///
    /// # Errors
    ///
    /// - `CreditBalanceMismatch` if the balance moved since the entry was built
    /// - `InvariantViolation` if the entry does not reconcile
    pub fn post(&mut self, entry: CreditLedgerEntry) -> Result<(), DistributionError> {
        self.check(&entry)?;
        self.balance = entry.new_balance;
        self.entries.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(previous: i64, final_balance: i64) -> CreditLedgerEntry {
        let summary =
            CreditSummary::from_balances(MinorUnits::new(previous), MinorUnits::new(final_balance));
        CreditLedgerEntry::from_summary(TransactionId::new_v7(), &summary).unwrap()
    }

    #[test]
    fn test_post_moves_balance() {
        let mut ledger = CreditLedger::with_opening_balance(MinorUnits::new(2000));
        ledger.post(entry(2000, 500)).unwrap();
        ledger.post(entry(500, 1200)).unwrap();

        assert_eq!(ledger.balance(), MinorUnits::new(1200));
        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.entries()[0].used, MinorUnits::new(1500));
        assert_eq!(ledger.entries()[1].added, MinorUnits::new(700));
    }

    #[test]
    fn test_post_rejects_stale_previous_balance() {
        let mut ledger = CreditLedger::with_opening_balance(MinorUnits::new(2000));
        let result = ledger.post(entry(1500, 0));

        assert!(matches!(
            result,
            Err(DistributionError::CreditBalanceMismatch { .. })
        ));
        assert_eq!(ledger.balance(), MinorUnits::new(2000));
    }

    #[test]
    fn test_unbalanced_entry_is_rejected() {
        let mut ledger = CreditLedger::default();
        let mut bad = entry(0, 100);
        bad.new_balance = MinorUnits::new(90);

        assert!(matches!(
            ledger.post(bad),
            Err(DistributionError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_no_movement_entry() {
        assert!(!entry(300, 300).has_movement());
        assert!(entry(300, 0).has_movement());
    }
}
