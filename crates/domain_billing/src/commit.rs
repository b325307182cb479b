//! Commit guard
//!
//! A preview is advisory. Before anything is persisted the guard recomputes the
//! distribution against current data and only commits when the fresh result
//! still matches what the caller saw. What gets written is always the fresh
//! preview, never the one supplied by the caller.
//!
//! # State machine
//!
//! ```text
//! Received ──► RePreviewed ──► Matched ──► Persisted
//!     │              │
//!     │              └──► Mismatched ──► Rejected
//!     └──────────────────────────────────► Rejected
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

use core_kernel::{MinorUnits, OperationMetadata, PortError, TransactionId, UnitRef};
use crate::distribution::DistributionEngine;
use crate::error::DistributionError;
use crate::payment::PaymentMetadata;
use crate::ports::{CommitReceipt, PaymentLedgerPort};
use crate::preview::UnifiedPreview;
use crate::transaction::PaymentTransaction;

/// Stage of a commit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Received,
    RePreviewed,
    Matched,
    Mismatched,
    Persisted,
    Rejected,
}

impl CommitState {
    pub fn can_transition_to(&self, next: CommitState) -> bool {
        use CommitState::*;
        matches!(
            (self, next),
            (Received, RePreviewed)
                | (Received, Rejected)
                | (RePreviewed, Matched)
                | (RePreviewed, Mismatched)
                | (RePreviewed, Rejected)
                | (Matched, Persisted)
                | (Matched, Rejected)
                | (Mismatched, Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitState::Persisted | CommitState::Rejected)
    }
}

#[derive(Debug)]
struct CommitTracker {
    history: Vec<CommitState>,
}

impl CommitTracker {
    fn new() -> Self {
        Self {
            history: vec![CommitState::Received],
        }
    }

    fn current(&self) -> CommitState {
        self.history.last().copied().unwrap_or(CommitState::Received)
    }

    fn advance(&mut self, next: CommitState) -> Result<(), DistributionError> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(DistributionError::invariant(format!(
                "illegal commit transition {:?} -> {:?}",
                current, next
            )));
        }
        self.history.push(next);
        Ok(())
    }

    /// Moves to `Rejected` unless already terminal
    fn reject(&mut self) {
        if !self.current().is_terminal() {
            self.history.push(CommitState::Rejected);
        }
    }
}

/// Outcome of comparing a caller's preview against a fresh one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewComparison {
    Matched,
    Mismatched {
        expected: MinorUnits,
        actual: MinorUnits,
        reason: String,
    },
}

/// Compares a caller's preview with a freshly computed one
///
/// The per-bill lines, the starting credit and the degraded modules must match
/// exactly. Two previews with equal lines always have equal totals, so
/// `tolerance` only matters for the `total_allocated` figure the caller sends
/// back: a client that rounded or re-summed it may be off by up to
/// `tolerance` without the commit being rejected. The fresh preview is what
/// gets persisted either way.
pub fn compare_previews(
    proposed: &UnifiedPreview,
    fresh: &UnifiedPreview,
    tolerance: MinorUnits,
) -> PreviewComparison {
    let expected = proposed.totals.total_allocated;
    let actual = fresh.totals.total_allocated;
    let mismatch = |reason: String| PreviewComparison::Mismatched {
        expected,
        actual,
        reason,
    };

    if expected.abs_diff(actual) > tolerance {
        return mismatch(format!(
            "total allocated differs by {}",
            expected.abs_diff(actual)
        ));
    }
    if proposed.funds.existing_credit != fresh.funds.existing_credit {
        return mismatch(format!(
            "credit balance changed from {} to {}",
            proposed.funds.existing_credit, fresh.funds.existing_credit
        ));
    }
    if proposed.degraded_modules != fresh.degraded_modules {
        return mismatch("bill source availability changed".to_string());
    }
    if proposed.allocation_lines() != fresh.allocation_lines() {
        return mismatch("per-bill allocation changed".to_string());
    }
    PreviewComparison::Matched
}

/// Per-unit mutual exclusion for commits within this process
#[derive(Debug, Default)]
pub struct UnitLocks {
    locks: Mutex<HashMap<UnitRef, Arc<Mutex<()>>>>,
}

impl UnitLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the unit
    pub async fn acquire(&self, unit: &UnitRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(unit.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// A successful commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub transaction_id: TransactionId,
    pub state: CommitState,
    pub state_history: Vec<CommitState>,
    /// The freshly computed preview that was persisted
    pub preview: UnifiedPreview,
    pub receipt: CommitReceipt,
}

/// Re-verifies previews and persists payments
pub struct CommitGuard {
    engine: Arc<DistributionEngine>,
    ledger: Arc<dyn PaymentLedgerPort>,
    locks: UnitLocks,
}

impl CommitGuard {
    pub fn new(engine: Arc<DistributionEngine>, ledger: Arc<dyn PaymentLedgerPort>) -> Self {
        Self {
            engine,
            ledger,
            locks: UnitLocks::new(),
        }
    }

    pub fn engine(&self) -> &Arc<DistributionEngine> {
        &self.engine
    }

    pub fn ledger(&self) -> &Arc<dyn PaymentLedgerPort> {
        &self.ledger
    }

    /// Re-previews, compares and commits a payment
    ///
    /// # Arguments
    ///
    /// * `proposed` - The preview the caller accepted
    /// * `payment` - How the payment was received
    /// * `metadata` - Correlation and audit data passed to the ledger
    ///
    /// # Errors
    ///
    /// - `Validation` for a statement preview or invalid payment details
    /// - `PreviewStale` when the fresh distribution differs from `proposed`
    /// - `Port` when persistence fails; nothing is written in that case
    #[instrument(skip_all, fields(unit = %proposed.unit))]
    pub async fn verify_and_commit(
        &self,
        proposed: &UnifiedPreview,
        payment: PaymentMetadata,
        metadata: Option<OperationMetadata>,
    ) -> Result<CommitResult, DistributionError> {
        let mut tracker = CommitTracker::new();

        if !proposed.is_committable() {
            tracker.reject();
            return Err(DistributionError::validation(
                "a statement preview cannot be committed; preview with a payment amount",
            ));
        }
        if let Err(e) = payment.validate() {
            tracker.reject();
            return Err(e);
        }

        let _guard = self.locks.acquire(&proposed.unit).await;

        let fresh = match self
            .engine
            .preview(
                &proposed.unit,
                Some(proposed.funds.incoming_payment),
                proposed.as_of_date,
            )
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                tracker.reject();
                return Err(e);
            }
        };
        tracker.advance(CommitState::RePreviewed)?;

        let tolerance = self.engine.config().commit_tolerance;
        if let PreviewComparison::Mismatched {
            expected,
            actual,
            reason,
        } = compare_previews(proposed, &fresh, tolerance)
        {
            tracker.advance(CommitState::Mismatched)?;
            tracker.reject();
            warn!(%expected, %actual, %reason, "Rejecting stale preview");
            return Err(DistributionError::PreviewStale {
                expected,
                actual,
                reason,
            });
        }
        tracker.advance(CommitState::Matched)?;

        let transaction = PaymentTransaction::from_preview(&fresh, payment)?;
        let receipt = match self.ledger.commit_payment(&transaction, metadata).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracker.reject();
                warn!(transaction_id = %transaction.id, error = %e, "Payment commit failed");
                return Err(map_commit_error(e, &fresh));
            }
        };
        tracker.advance(CommitState::Persisted)?;

        info!(
            transaction_id = %receipt.transaction_id,
            allocated = %fresh.totals.total_allocated,
            bills_updated = receipt.bills_updated,
            credit_balance = %receipt.credit_balance,
            "Payment committed"
        );

        Ok(CommitResult {
            transaction_id: receipt.transaction_id,
            state: tracker.current(),
            state_history: tracker.history,
            preview: fresh,
            receipt,
        })
    }
}

/// Write-time conflicts surface as a stale preview
fn map_commit_error(err: PortError, fresh: &UnifiedPreview) -> DistributionError {
    match err {
        PortError::Conflict { message } => DistributionError::PreviewStale {
            expected: fresh.totals.total_allocated,
            actual: fresh.totals.total_allocated,
            reason: message,
        },
        other => DistributionError::Port(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut tracker = CommitTracker::new();
        tracker.advance(CommitState::RePreviewed).unwrap();
        tracker.advance(CommitState::Matched).unwrap();
        tracker.advance(CommitState::Persisted).unwrap();

        assert_eq!(tracker.current(), CommitState::Persisted);
        assert_eq!(tracker.history.len(), 4);
    }

    #[test]
    fn test_mismatch_cannot_persist() {
        let mut tracker = CommitTracker::new();
        tracker.advance(CommitState::RePreviewed).unwrap();
        tracker.advance(CommitState::Mismatched).unwrap();

        assert!(tracker.advance(CommitState::Persisted).is_err());
        tracker.reject();
        assert_eq!(tracker.current(), CommitState::Rejected);
    }

    #[test]
    fn test_cannot_skip_re_preview() {
        assert!(!CommitState::Received.can_transition_to(CommitState::Matched));
        assert!(!CommitState::Received.can_transition_to(CommitState::Persisted));
    }

    #[test]
    fn test_reject_is_idempotent_on_terminal_state() {
        let mut tracker = CommitTracker::new();
        tracker.reject();
        tracker.reject();
        assert_eq!(tracker.history, vec![CommitState::Received, CommitState::Rejected]);
    }

    #[tokio::test]
    async fn test_unit_locks_serialize_same_unit() {
        let locks = UnitLocks::new();
        let unit = UnitRef::parse("ACME", "101").unwrap();

        let guard = locks.acquire(&unit).await;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.acquire(&unit),
        )
        .await;
        assert!(second.is_err());

        drop(guard);
        let third = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.acquire(&unit),
        )
        .await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_unit_locks_do_not_block_other_units() {
        let locks = UnitLocks::new();
        let a = UnitRef::parse("ACME", "101").unwrap();
        let b = UnitRef::parse("ACME", "102").unwrap();

        let _guard = locks.acquire(&a).await;
        let other = tokio::time::timeout(std::time::Duration::from_millis(50), locks.acquire(&b)).await;
        assert!(other.is_ok());
    }
}
