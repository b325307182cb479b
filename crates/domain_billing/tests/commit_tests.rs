//! Commit guard tests for domain_billing

use core_kernel::{MinorUnits, OperationMetadata};
use domain_billing::{
    compare_previews, BillStatus, CommitState, DistributionError, ModuleType, PaymentMetadata,
    PaymentMethod, PreviewComparison,
};
use test_utils::{BillFixtures, DateFixtures, TestHarness, TestHarnessBuilder};

fn cash() -> PaymentMetadata {
    PaymentMetadata::new(PaymentMethod::Cash, DateFixtures::as_of())
}

async fn two_past_due_bills() -> TestHarness {
    TestHarnessBuilder::new()
        .with_bill(BillFixtures::past_due_dues())
        .with_bill(BillFixtures::past_due_utility())
        .build()
        .await
}

// ============================================================================
// Successful Commit Tests
// ============================================================================

mod success_tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_updates_both_modules_and_credit() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(10_000)), DateFixtures::as_of())
            .await
            .unwrap();

        let result = harness
            .guard
            .verify_and_commit(&preview, cash(), None)
            .await
            .unwrap();

        assert_eq!(result.state, CommitState::Persisted);
        assert_eq!(
            result.state_history,
            vec![
                CommitState::Received,
                CommitState::RePreviewed,
                CommitState::Matched,
                CommitState::Persisted,
            ]
        );
        assert_eq!(result.receipt.bills_updated, 2);
        assert_eq!(result.receipt.credit_balance, MinorUnits::new(1_700));

        let store = &harness.store;
        assert!(store.bill(&harness.unit, ModuleType::Dues, "2025-11").await.is_none());
        assert!(store.bill(&harness.unit, ModuleType::Utility, "2025-11").await.is_none());
        assert_eq!(store.credit_balance(&harness.unit).await, Some(MinorUnits::new(1_700)));
    }

    #[tokio::test]
    async fn test_partial_commit_leaves_remaining_balance() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(6_000)), DateFixtures::as_of())
            .await
            .unwrap();

        harness
            .guard
            .verify_and_commit(&preview, cash(), None)
            .await
            .unwrap();

        // Dues cleared, utility base reduced from 3000 to 2000, penalty untouched
        let utility = harness
            .store
            .bill(&harness.unit, ModuleType::Utility, "2025-11")
            .await
            .unwrap();
        assert_eq!(utility.base_amount_due, MinorUnits::new(2_000));
        assert_eq!(utility.penalty_amount_due, MinorUnits::new(300));
        assert_eq!(harness.store.credit_balance(&harness.unit).await, Some(MinorUnits::ZERO));
    }

    #[tokio::test]
    async fn test_commit_records_one_transaction_for_both_modules() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(8_300)), DateFixtures::as_of())
            .await
            .unwrap();
        let payment = PaymentMetadata::new(PaymentMethod::BankTransfer, DateFixtures::as_of())
            .with_reference("SPEI-778812");
        let metadata = OperationMetadata::with_correlation_id("req-42").initiated_by("treasurer");

        let result = harness
            .guard
            .verify_and_commit(&preview, payment, Some(metadata))
            .await
            .unwrap();

        let transactions = harness.store.transactions().await;
        assert_eq!(transactions.len(), 1);
        let transaction = &transactions[0];
        assert_eq!(transaction.id, result.transaction_id);
        assert_eq!(transaction.dues.lines.len(), 1);
        assert_eq!(transaction.utility.lines.len(), 1);
        assert_eq!(transaction.utility.lines[0].penalty_paid, MinorUnits::new(300));
        assert_eq!(transaction.utility.lines[0].new_status, BillStatus::Paid);
        assert_eq!(transaction.payment.reference.as_deref(), Some("SPEI-778812"));
        assert_eq!(transaction.credit_entry.transaction_id, transaction.id);
        assert!(!transaction.credit_entry.has_movement());
    }

    #[tokio::test]
    async fn test_commit_persists_recomputed_preview() {
        let harness = two_past_due_bills().await;
        let mut preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(5_000)), DateFixtures::as_of())
            .await
            .unwrap();
        let real_outstanding = preview.totals.total_outstanding_after;
        preview.totals.total_outstanding_after = MinorUnits::ZERO;

        let result = harness
            .guard
            .verify_and_commit(&preview, cash(), None)
            .await
            .unwrap();

        assert_eq!(result.preview.totals.total_outstanding_after, real_outstanding);
    }

    #[tokio::test]
    async fn test_credit_only_commit_consumes_credit() {
        let harness = TestHarnessBuilder::new()
            .with_credit(1_000)
            .with_bill(BillFixtures::current_utility())
            .build()
            .await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::ZERO), DateFixtures::as_of())
            .await
            .unwrap();
        let payment = PaymentMetadata::new(PaymentMethod::CreditOnly, DateFixtures::as_of());

        harness
            .guard
            .verify_and_commit(&preview, payment, None)
            .await
            .unwrap();

        let utility = harness
            .store
            .bill(&harness.unit, ModuleType::Utility, "2026-00")
            .await
            .unwrap();
        assert_eq!(utility.base_amount_due, MinorUnits::new(1_500));
        assert_eq!(harness.store.credit_balance(&harness.unit).await, Some(MinorUnits::ZERO));
    }
}

// ============================================================================
// Stale Preview Tests
// ============================================================================

mod stale_tests {
    use super::*;

    #[tokio::test]
    async fn test_bill_paid_elsewhere_rejects_commit() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(10_000)), DateFixtures::as_of())
            .await
            .unwrap();

        harness
            .store
            .apply_external_payment(&harness.unit, ModuleType::Dues, "2025-11", MinorUnits::new(2_000))
            .await
            .unwrap();

        let result = harness.guard.verify_and_commit(&preview, cash(), None).await;

        match result {
            Err(DistributionError::PreviewStale { expected, actual, .. }) => {
                assert_eq!(expected, MinorUnits::new(8_300));
                assert_eq!(actual, MinorUnits::new(6_300));
            }
            other => panic!("expected stale preview, got {:?}", other),
        }
        assert!(harness.store.transactions().await.is_empty());
        let dues = harness
            .store
            .bill(&harness.unit, ModuleType::Dues, "2025-11")
            .await
            .unwrap();
        assert_eq!(dues.base_amount_due, MinorUnits::new(2_500));
        assert_eq!(dues.penalty_amount_due, MinorUnits::new(500));
    }

    #[tokio::test]
    async fn test_rerouted_funds_with_same_total_are_rejected() {
        // The payment covers the dues bill either way, so the total allocated
        // is unchanged, but the external payment moves money to utility
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(5_000)), DateFixtures::as_of())
            .await
            .unwrap();

        harness
            .store
            .apply_external_payment(&harness.unit, ModuleType::Dues, "2025-11", MinorUnits::new(1_000))
            .await
            .unwrap();

        let err = harness
            .guard
            .verify_and_commit(&preview, cash(), None)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(harness.store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_credit_change_rejects_commit() {
        let harness = TestHarnessBuilder::new()
            .with_credit(500)
            .with_bill(BillFixtures::past_due_dues())
            .build()
            .await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(1_000)), DateFixtures::as_of())
            .await
            .unwrap();

        harness.store.overwrite_credit(&harness.unit, MinorUnits::new(400)).await;

        let result = harness.guard.verify_and_commit(&preview, cash(), None).await;
        assert!(matches!(result, Err(DistributionError::PreviewStale { .. })));
    }

    #[tokio::test]
    async fn test_same_preview_cannot_be_committed_twice() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(8_300)), DateFixtures::as_of())
            .await
            .unwrap();

        harness
            .guard
            .verify_and_commit(&preview, cash(), None)
            .await
            .unwrap();
        let second = harness.guard.verify_and_commit(&preview, cash(), None).await;

        assert!(matches!(second, Err(DistributionError::PreviewStale { .. })));
        assert_eq!(harness.store.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commits_of_one_preview_persist_once() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(8_300)), DateFixtures::as_of())
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            harness.guard.verify_and_commit(&preview, cash(), None),
            harness.guard.verify_and_commit(&preview, cash(), None),
        );

        let succeeded = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(succeeded, 1);
        assert_eq!(harness.store.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_source_outage_at_commit_time_rejects() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(8_300)), DateFixtures::as_of())
            .await
            .unwrap();

        harness.store.fail_module(ModuleType::Utility).await;
        let result = harness.guard.verify_and_commit(&preview, cash(), None).await;

        assert!(matches!(result, Err(DistributionError::PreviewStale { .. })));
        assert!(harness.store.transactions().await.is_empty());
    }
}

// ============================================================================
// Rejected Input Tests
// ============================================================================

mod rejection_tests {
    use super::*;

    #[tokio::test]
    async fn test_statement_preview_cannot_be_committed() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, None, DateFixtures::as_of())
            .await
            .unwrap();

        let result = harness.guard.verify_and_commit(&preview, cash(), None).await;

        assert!(matches!(result, Err(DistributionError::Validation(_))));
        assert!(harness.store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_without_reference_is_rejected() {
        let harness = two_past_due_bills().await;
        let preview = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(1_000)), DateFixtures::as_of())
            .await
            .unwrap();
        let payment = PaymentMetadata::new(PaymentMethod::BankTransfer, DateFixtures::as_of());

        let result = harness.guard.verify_and_commit(&preview, payment, None).await;

        assert!(matches!(result, Err(DistributionError::Validation(_))));
    }
}

// ============================================================================
// Comparison Tests
// ============================================================================

mod comparison_tests {
    use super::*;

    #[tokio::test]
    async fn test_total_difference_within_tolerance_matches() {
        let harness = two_past_due_bills().await;
        let fresh = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(4_000)), DateFixtures::as_of())
            .await
            .unwrap();

        let mut within = fresh.clone();
        within.totals.total_allocated = MinorUnits::new(4_001);
        assert_eq!(
            compare_previews(&within, &fresh, MinorUnits::new(1)),
            PreviewComparison::Matched
        );

        let mut beyond = fresh.clone();
        beyond.totals.total_allocated = MinorUnits::new(4_002);
        assert!(matches!(
            compare_previews(&beyond, &fresh, MinorUnits::new(1)),
            PreviewComparison::Mismatched { .. }
        ));
    }

    #[tokio::test]
    async fn test_guard_accepts_total_drift_within_tolerance_and_persists_fresh_total() {
        let harness = two_past_due_bills().await;
        let mut proposed = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(4_000)), DateFixtures::as_of())
            .await
            .unwrap();
        proposed.totals.total_allocated = MinorUnits::new(3_999);

        let result = harness
            .guard
            .verify_and_commit(&proposed, cash(), None)
            .await
            .unwrap();

        assert_eq!(result.state, CommitState::Persisted);
        assert_eq!(result.preview.totals.total_allocated, MinorUnits::new(4_000));
    }

    #[tokio::test]
    async fn test_guard_rejects_total_drift_beyond_tolerance() {
        let harness = two_past_due_bills().await;
        let mut proposed = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(4_000)), DateFixtures::as_of())
            .await
            .unwrap();
        proposed.totals.total_allocated = MinorUnits::new(3_990);

        let result = harness.guard.verify_and_commit(&proposed, cash(), None).await;

        assert!(matches!(result, Err(DistributionError::PreviewStale { .. })));
        assert!(harness.store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_line_difference_is_mismatch_even_with_equal_totals() {
        let harness = two_past_due_bills().await;
        let fresh = harness
            .engine
            .preview(&harness.unit, Some(MinorUnits::new(4_000)), DateFixtures::as_of())
            .await
            .unwrap();

        let mut altered = fresh.clone();
        altered.dues.bills[0].amount_paid = MinorUnits::new(3_999);

        assert!(matches!(
            compare_previews(&altered, &fresh, MinorUnits::new(1)),
            PreviewComparison::Mismatched { .. }
        ));
    }
}
