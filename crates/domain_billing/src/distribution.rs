//! The distribution engine
//!
//! Fetches unpaid bills from both modules, ranks them into priority tiers,
//! allocates the available funds and assembles a [`UnifiedPreview`]. The
//! engine writes nothing; persistence happens only through the commit guard.
//!
//! # Flow
//!
//! ```text
//! preview(unit, amount, as_of)
//!   ├─ unit exists?                       UnitAccountPort
//!   ├─ credit balance + fiscal year start UnitAccountPort
//!   └─ distribute(unit, funds, as_of)
//!        ├─ fetch dues ┐ concurrently, each bounded by a timeout;
//!        ├─ fetch util ┘ a failed module contributes no bills
//!        ├─ classify + sort               classifier
//!        ├─ allocate tier by tier         allocator
//!        ├─ verify                        invariants
//!        └─ split per module              splitter
//! ```

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{FiscalYearStart, MinorUnits, UnitRef};
use crate::allocator::{allocate_tier, AllocationResult};
use crate::bill::{Bill, ModuleType};
use crate::classifier::{rank_bills, PriorityRank, RankedBill};
use crate::config::EngineConfig;
use crate::error::DistributionError;
use crate::invariants::{verify_allocations, verify_conservation};
use crate::ports::{BillSourcePort, UnitAccountPort};
use crate::preview::{CreditSummary, FundsEnvelope, PreviewMode, PreviewTotals, UnifiedPreview};
use crate::splitter::{split, BillIndex};

/// Bill sources for both modules
#[derive(Clone)]
pub struct BillSources {
    pub dues: Arc<dyn BillSourcePort>,
    pub utility: Arc<dyn BillSourcePort>,
}

impl BillSources {
    pub fn new(dues: Arc<dyn BillSourcePort>, utility: Arc<dyn BillSourcePort>) -> Self {
        Self { dues, utility }
    }

    pub fn for_module(&self, module: ModuleType) -> &Arc<dyn BillSourcePort> {
        match module {
            ModuleType::Dues => &self.dues,
            ModuleType::Utility => &self.utility,
        }
    }
}

/// Bills gathered from both modules
#[derive(Debug, Default)]
struct FetchedBills {
    bills: Vec<Bill>,
    degraded: Vec<ModuleType>,
}

/// The result of allocating funds across ranked bills, before module split
#[derive(Debug, Clone)]
pub struct DistributionPlan {
    pub ranked: Vec<RankedBill>,
    pub excluded: Vec<Bill>,
    /// Bills that received money, in payment order
    pub results: Vec<AllocationResult>,
    /// Tiers that were offered funds, in the order they were offered
    pub tiers_funded: Vec<PriorityRank>,
    pub total_allocated: MinorUnits,
    pub credit: CreditSummary,
}

/// Ranks and allocates without any I/O
///
/// Tiers are funded one at a time, lowest rank first. A tier only sees what
/// the tiers before it left over, and the loop stops as soon as nothing
/// remains. Whatever is left after the last tier becomes the unit's new
/// credit balance.
pub fn plan_distribution(
    bills: Vec<Bill>,
    funds: FundsEnvelope,
    as_of: NaiveDate,
    fiscal_year_start: FiscalYearStart,
) -> Result<DistributionPlan, DistributionError> {
    let total_available = funds.total()?;
    let (ranked, excluded) = rank_bills(bills, as_of, fiscal_year_start);

    let mut remaining = total_available;
    let mut results = Vec::new();
    let mut tiers_funded = Vec::new();

    for rank in PriorityRank::ALL {
        if !remaining.is_positive() {
            break;
        }
        let tier = tier_slice(&ranked, rank);
        if tier.is_empty() {
            continue;
        }

        let allocation = allocate_tier(tier, remaining)?;
        verify_allocations(tier, &allocation.results)?;
        debug!(tier = %rank, bills = tier.len(), offered = %remaining, leftover = %allocation.leftover, "Tier allocated");

        remaining = allocation.leftover;
        tiers_funded.push(rank);
        results.extend(
            allocation
                .results
                .into_iter()
                .filter(|r| r.amount_paid.is_positive()),
        );
    }

    let total_allocated = MinorUnits::checked_sum(results.iter().map(|r| r.amount_paid))?;
    let credit = CreditSummary::from_balances(funds.existing_credit, remaining);
    verify_conservation(total_available, total_allocated, &credit)?;

    Ok(DistributionPlan {
        ranked,
        excluded,
        results,
        tiers_funded,
        total_allocated,
        credit,
    })
}

/// The contiguous run of `ranked` holding bills of one rank
fn tier_slice(ranked: &[RankedBill], rank: PriorityRank) -> &[RankedBill] {
    let start = ranked.partition_point(|r| r.rank < rank);
    let end = ranked.partition_point(|r| r.rank <= rank);
    &ranked[start..end]
}

/// Previews how a payment is distributed across a unit's dues and utility bills
pub struct DistributionEngine {
    sources: BillSources,
    accounts: Arc<dyn UnitAccountPort>,
    config: EngineConfig,
}

impl DistributionEngine {
    /// Creates an engine
    ///
    /// # Arguments
    ///
    /// * `sources` - Bill sources for both modules
    /// * `accounts` - Unit existence, credit balance and fiscal calendar
    /// * `config` - Timeouts and tolerances
    pub fn new(
        sources: BillSources,
        accounts: Arc<dyn UnitAccountPort>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sources,
            accounts,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sources(&self) -> &BillSources {
        &self.sources
    }

    pub fn accounts(&self) -> &Arc<dyn UnitAccountPort> {
        &self.accounts
    }

    /// Previews a payment for a unit
    ///
    /// Without an amount, the preview is a statement: funds are treated as
    /// unbounded so every payable bill shows as fully paid, the incoming
    /// payment is reported as the balance owed after credit, and the result
    /// cannot be committed.
    ///
    /// # Errors
    ///
    /// - `Validation` for a negative amount
    /// - `NotFound` if the unit does not exist
    /// - `Port` if the unit account cannot be read
    #[instrument(skip(self), fields(unit = %unit))]
    pub async fn preview(
        &self,
        unit: &UnitRef,
        amount: Option<MinorUnits>,
        as_of: NaiveDate,
    ) -> Result<UnifiedPreview, DistributionError> {
        if let Some(amount) = amount {
            if amount.is_negative() {
                return Err(DistributionError::validation(format!(
                    "payment amount cannot be negative: {}",
                    amount
                )));
            }
        }

        if !self.accounts.unit_exists(unit).await? {
            return Err(DistributionError::not_found(format!("Unit {}", unit)));
        }

        let credit = self.accounts.fetch_credit_balance(unit).await?;
        let fiscal_year_start = self.accounts.fetch_fiscal_year_start(&unit.client_id).await?;

        let (incoming, mode) = match amount {
            Some(amount) => (amount, PreviewMode::Payment),
            None => (self.config.statement_funds, PreviewMode::Statement),
        };
        let funds = FundsEnvelope::new(incoming, credit)?;

        let preview = self.distribute(unit, funds, as_of, fiscal_year_start).await?;
        match mode {
            PreviewMode::Payment => Ok(preview),
            PreviewMode::Statement => preview.into_statement(),
        }
    }

    /// Distributes a funds envelope across the unit's bills
    ///
    /// A module whose bill source fails or times out contributes no bills and
    /// is listed in `degraded_modules`; the other module is still paid.
    #[instrument(skip(self, funds), fields(unit = %unit, available = tracing::field::Empty))]
    pub async fn distribute(
        &self,
        unit: &UnitRef,
        funds: FundsEnvelope,
        as_of: NaiveDate,
        fiscal_year_start: FiscalYearStart,
    ) -> Result<UnifiedPreview, DistributionError> {
        let total_available = funds.total()?;
        tracing::Span::current().record("available", total_available.value());

        let fetched = self.fetch_all(unit, as_of).await;
        debug!(bills = fetched.bills.len(), "Fetched unpaid bills");

        let plan = plan_distribution(fetched.bills, funds, as_of, fiscal_year_start)?;
        let outstanding_before = outstanding(&plan.ranked)?;
        let total_outstanding_after = outstanding_before.checked_sub(plan.total_allocated)?;

        let index = BillIndex::build(&plan.ranked)?;
        let module_split = split(&plan.results, &index, plan.credit)?;

        let totals = PreviewTotals {
            total_available,
            total_allocated: plan.total_allocated,
            total_base_paid: module_split
                .dues
                .base_paid
                .checked_add(module_split.utility.base_paid)?,
            total_penalty_paid: module_split
                .dues
                .penalty_paid
                .checked_add(module_split.utility.penalty_paid)?,
            total_outstanding_before: outstanding_before,
            total_outstanding_after,
        };

        info!(
            allocated = %plan.total_allocated,
            credit = %plan.credit.final_balance,
            ranked = plan.ranked.len(),
            excluded = plan.excluded.len(),
            degraded = fetched.degraded.len(),
            "Payment distribution computed"
        );

        Ok(UnifiedPreview {
            unit: unit.clone(),
            as_of_date: as_of,
            mode: PreviewMode::Payment,
            funds,
            totals,
            dues: module_split.dues,
            utility: module_split.utility,
            credit: module_split.credit,
            bills_considered: plan.ranked.len(),
            bills_excluded: plan.excluded.len(),
            degraded_modules: fetched.degraded,
        })
    }

    async fn fetch_all(&self, unit: &UnitRef, as_of: NaiveDate) -> FetchedBills {
        let (dues, utility) = tokio::join!(
            self.fetch_module(ModuleType::Dues, unit, as_of),
            self.fetch_module(ModuleType::Utility, unit, as_of),
        );

        let mut fetched = FetchedBills::default();
        for (module, result) in [(ModuleType::Dues, dues), (ModuleType::Utility, utility)] {
            match result {
                Ok(bills) => fetched.bills.extend(bills),
                Err(e) => {
                    warn!(%module, error = %e, "Bill source unavailable, continuing without it");
                    fetched.degraded.push(module);
                }
            }
        }
        fetched
    }

    async fn fetch_module(
        &self,
        module: ModuleType,
        unit: &UnitRef,
        as_of: NaiveDate,
    ) -> Result<Vec<Bill>, DistributionError> {
        let source = self.sources.for_module(module);
        let timeout = self.config.fetch_timeout();

        let bills = tokio::time::timeout(timeout, source.fetch_unpaid_bills(unit, as_of))
            .await
            .map_err(|_| DistributionError::PartialSourceFailure {
                module,
                reason: format!("timed out after {}ms", timeout.as_millis()),
            })?
            .map_err(|e| DistributionError::PartialSourceFailure {
                module,
                reason: e.to_string(),
            })?;

        validate_source_bills(module, &bills)?;
        Ok(bills)
    }
}

/// Rejects a module's batch when any bill is malformed or duplicated
fn validate_source_bills(module: ModuleType, bills: &[Bill]) -> Result<(), DistributionError> {
    let mut seen = std::collections::BTreeSet::new();
    for bill in bills {
        if bill.module != module {
            return Err(DistributionError::PartialSourceFailure {
                module,
                reason: format!("returned a {} bill for period {}", bill.module, bill.period),
            });
        }
        bill.validate().map_err(|e| DistributionError::PartialSourceFailure {
            module,
            reason: e.to_string(),
        })?;
        if !seen.insert(bill.period.as_str()) {
            return Err(DistributionError::PartialSourceFailure {
                module,
                reason: format!("returned period {} twice", bill.period),
            });
        }
    }
    Ok(())
}

fn outstanding(ranked: &[RankedBill]) -> Result<MinorUnits, DistributionError> {
    let mut total = MinorUnits::ZERO;
    for r in ranked {
        total = total.checked_add(r.bill.total_due()?)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::BillStatus;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plan_pays_past_due_utility_before_current_dues() {
        let as_of = date(2026, 7, 15);
        let bills = vec![
            Bill::new(ModuleType::Dues, "2026-00", date(2026, 7, 20), MinorUnits::new(5000)),
            Bill::new(ModuleType::Utility, "2025-11", date(2026, 6, 30), MinorUnits::new(3000)),
        ];
        let funds = FundsEnvelope::new(MinorUnits::new(4000), MinorUnits::ZERO).unwrap();

        let plan = plan_distribution(bills, funds, as_of, FiscalYearStart::new(7).unwrap()).unwrap();

        assert_eq!(plan.results[0].period.to_string(), "utility:2025-11");
        assert_eq!(plan.results[0].new_status, BillStatus::Paid);
        assert_eq!(plan.results[1].amount_paid, MinorUnits::new(1000));
        assert_eq!(plan.credit.final_balance, MinorUnits::ZERO);
    }

    #[test]
    fn test_exhausted_tier_stops_later_tiers() {
        let as_of = date(2026, 7, 15);
        let bills = vec![
            Bill::new(ModuleType::Dues, "2025-10", date(2026, 5, 1), MinorUnits::new(3000)),
            Bill::new(ModuleType::Dues, "2025-11", date(2026, 6, 1), MinorUnits::new(3000)),
            Bill::new(ModuleType::Utility, "2025-11", date(2026, 6, 30), MinorUnits::new(2000)),
            Bill::new(ModuleType::Dues, "2026-00", date(2026, 7, 20), MinorUnits::new(5000)),
        ];
        let funds = FundsEnvelope::new(MinorUnits::new(4500), MinorUnits::ZERO).unwrap();

        let plan = plan_distribution(bills, funds, as_of, FiscalYearStart::new(7).unwrap()).unwrap();

        assert_eq!(plan.tiers_funded, vec![PriorityRank::PastDueDues]);
        assert_eq!(plan.results.len(), 2);
        assert_eq!(plan.results[0].new_status, BillStatus::Paid);
        assert_eq!(plan.results[1].period.to_string(), "dues:2025-11");
        assert_eq!(plan.results[1].amount_paid, MinorUnits::new(1500));
        assert_eq!(plan.results[1].new_status, BillStatus::Partial);
        assert_eq!(plan.ranked.len(), 4);
    }

    #[test]
    fn test_leftover_flows_into_next_tier() {
        let as_of = date(2026, 7, 15);
        let bills = vec![
            Bill::new(ModuleType::Dues, "2025-11", date(2026, 6, 1), MinorUnits::new(3000)),
            Bill::new(ModuleType::Dues, "2026-00", date(2026, 7, 20), MinorUnits::new(5000)),
        ];
        let funds = FundsEnvelope::new(MinorUnits::new(4000), MinorUnits::ZERO).unwrap();

        let plan = plan_distribution(bills, funds, as_of, FiscalYearStart::new(7).unwrap()).unwrap();

        assert_eq!(
            plan.tiers_funded,
            vec![PriorityRank::PastDueDues, PriorityRank::CurrentDues]
        );
        assert_eq!(plan.results[1].amount_paid, MinorUnits::new(1000));
        assert_eq!(plan.credit.final_balance, MinorUnits::ZERO);
    }

    #[test]
    fn test_no_funds_offers_no_tier() {
        let bills = vec![Bill::new(
            ModuleType::Dues,
            "2025-11",
            date(2026, 6, 1),
            MinorUnits::new(3000),
        )];
        let funds = FundsEnvelope::new(MinorUnits::ZERO, MinorUnits::ZERO).unwrap();

        let plan = plan_distribution(bills, funds, date(2026, 7, 15), FiscalYearStart::JANUARY).unwrap();

        assert!(plan.tiers_funded.is_empty());
        assert!(plan.results.is_empty());
        assert_eq!(plan.total_allocated, MinorUnits::ZERO);
    }

    #[test]
    fn test_plan_surplus_becomes_credit() {
        let as_of = date(2026, 7, 15);
        let bills = vec![Bill::new(
            ModuleType::Dues,
            "2026-00",
            date(2026, 7, 1),
            MinorUnits::new(1000),
        )];
        let funds = FundsEnvelope::new(MinorUnits::new(1500), MinorUnits::new(200)).unwrap();

        let plan = plan_distribution(bills, funds, as_of, FiscalYearStart::JANUARY).unwrap();

        assert_eq!(plan.total_allocated, MinorUnits::new(1000));
        assert_eq!(plan.credit.added, MinorUnits::new(500));
        assert_eq!(plan.credit.final_balance, MinorUnits::new(700));
    }

    #[test]
    fn test_source_batch_with_duplicate_period_is_rejected() {
        let due = date(2026, 7, 1);
        let bills = vec![
            Bill::new(ModuleType::Utility, "2026-00", due, MinorUnits::new(100)),
            Bill::new(ModuleType::Utility, "2026-00", due, MinorUnits::new(200)),
        ];
        assert!(matches!(
            validate_source_bills(ModuleType::Utility, &bills),
            Err(DistributionError::PartialSourceFailure { module: ModuleType::Utility, .. })
        ));
    }

    #[test]
    fn test_source_batch_with_foreign_module_is_rejected() {
        let bills = vec![Bill::new(
            ModuleType::Dues,
            "2026-00",
            date(2026, 7, 1),
            MinorUnits::new(100),
        )];
        assert!(validate_source_bills(ModuleType::Utility, &bills).is_err());
    }
}
