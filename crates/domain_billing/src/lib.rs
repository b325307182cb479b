//! Billing Domain - Unified Payment Distribution
//!
//! This crate distributes a single incoming payment across the two billing
//! modules a unit is charged under: HOA maintenance dues and metered water.
//!
//! # Priority tiers
//!
//! Bills from both modules are merged and paid in one global order:
//!
//! 1. Past-due dues
//! 2. Past-due utility
//! 3. Dues in the current fiscal month
//! 4. Utility in the current fiscal month
//! 5. Future dues (prepayment)
//!
//! Future utility bills are never paid. Within a tier, the oldest due date is
//! paid first; within a bill, the base charge before the penalty. Whatever is
//! left becomes unit credit.
//!
//! # Preview and commit
//!
//! [`DistributionEngine::preview`] is read-only and deterministic. A caller
//! commits an accepted preview through [`CommitGuard::verify_and_commit`],
//! which recomputes it and persists only if nothing changed in between.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{CommitGuard, DistributionEngine, PaymentMetadata, PaymentMethod};
//!
//! let engine = Arc::new(DistributionEngine::new(sources, accounts, EngineConfig::default()));
//! let preview = engine.preview(&unit, Some(MinorUnits::new(800_000)), as_of).await?;
//!
//! let guard = CommitGuard::new(engine, ledger);
//! let payment = PaymentMetadata::new(PaymentMethod::BankTransfer, as_of).with_reference("SPEI-1");
//! let result = guard.verify_and_commit(&preview, payment, None).await?;
//! ```

pub mod bill;
pub mod classifier;
pub mod allocator;
pub mod preview;
pub mod splitter;
pub mod invariants;
pub mod distribution;
pub mod commit;
pub mod config;
pub mod penalty;
pub mod payment;
pub mod ledger;
pub mod transaction;
pub mod ports;
pub mod error;

pub use bill::{Bill, BillStatus, ModuleType, NamespacedPeriod};
pub use classifier::{classify, rank_bills, Classification, DueTiming, PriorityRank, RankedBill};
pub use allocator::{allocate_tier, AllocationResult, TierAllocation};
pub use preview::{
    CreditSummary, FundsEnvelope, ModuleAllocation, ModuleBillPayment, PreviewMode, PreviewTotals,
    UnifiedPreview,
};
pub use splitter::{split, BillIndex, ModuleSplit};
pub use distribution::{plan_distribution, BillSources, DistributionEngine, DistributionPlan};
pub use commit::{compare_previews, CommitGuard, CommitResult, CommitState, PreviewComparison, UnitLocks};
pub use config::EngineConfig;
pub use penalty::{MonthlyPenaltyPolicy, NoPenalty, PenaltyCalculator};
pub use payment::{PaymentMetadata, PaymentMethod};
pub use ledger::{CreditLedger, CreditLedgerEntry};
pub use transaction::{BillPaymentLine, ModuleCommit, PaymentTransaction};
pub use ports::{BillSourcePort, CommitReceipt, PaymentLedgerPort, UnitAccountPort};
pub use error::DistributionError;
