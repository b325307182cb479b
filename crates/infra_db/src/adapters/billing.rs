//! PostgreSQL Billing Adapters
//!
//! Internal (database) adapters for the billing ports:
//!
//! - [`PostgresBillSource`] serves one module's unpaid bills
//! - [`PostgresUnitAccountAdapter`] serves unit existence, credit and fiscal calendar
//! - [`PostgresPaymentLedger`] applies a committed payment in one transaction
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::{ModulePenalties, PostgresBillSource, PostgresPaymentLedger};
//! use domain_billing::{BillSources, ModuleType};
//! use std::sync::Arc;
//!
//! let penalties = ModulePenalties::none();
//! let sources = BillSources::new(
//!     Arc::new(PostgresBillSource::new(pool.clone(), ModuleType::Dues, penalties.dues())),
//!     Arc::new(PostgresBillSource::new(pool.clone(), ModuleType::Utility, penalties.utility())),
//! );
//! let ledger = Arc::new(PostgresPaymentLedger::new(pool, penalties));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    AdapterHealth, ClientId, DomainPort, FiscalYearStart, HealthCheckResult, HealthCheckable,
    MinorUnits, OperationMetadata, PortError, UnitRef,
};
use domain_billing::{
    Bill, BillSourcePort, CommitReceipt, ModuleType, NoPenalty, PaymentLedgerPort,
    PaymentTransaction, PenaltyCalculator, UnitAccountPort,
};

use crate::error::{db_to_port_error, DatabaseError};
use crate::repositories::{
    BillRepository, BillRow, BillSettlement, PaymentRepository, UnitAccountRepository,
};

/// Penalty calculators for each module
#[derive(Clone)]
pub struct ModulePenalties {
    dues: Arc<dyn PenaltyCalculator>,
    utility: Arc<dyn PenaltyCalculator>,
}

impl ModulePenalties {
    pub fn new(dues: Arc<dyn PenaltyCalculator>, utility: Arc<dyn PenaltyCalculator>) -> Self {
        Self { dues, utility }
    }

    /// Only penalties already assessed in the tables are owed
    pub fn none() -> Self {
        Self::new(Arc::new(NoPenalty), Arc::new(NoPenalty))
    }

    pub fn dues(&self) -> Arc<dyn PenaltyCalculator> {
        self.dues.clone()
    }

    pub fn utility(&self) -> Arc<dyn PenaltyCalculator> {
        self.utility.clone()
    }

    pub fn for_module(&self, module: ModuleType) -> &dyn PenaltyCalculator {
        match module {
            ModuleType::Dues => self.dues.as_ref(),
            ModuleType::Utility => self.utility.as_ref(),
        }
    }
}

impl std::fmt::Debug for ModulePenalties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModulePenalties").finish_non_exhaustive()
    }
}

/// Runs `SELECT 1` against the pool
async fn pool_health(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();

    let result = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await;

    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => HealthCheckResult {
            adapter_id: adapter_id.to_string(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: Utc::now(),
        },
        Err(e) => HealthCheckResult {
            adapter_id: adapter_id.to_string(),
            status: AdapterHealth::Unhealthy,
            latency_ms,
            message: Some(format!("Database error: {}", e)),
            checked_at: Utc::now(),
        },
    }
}

/// Converts a stored row into a bill owed as of the date
///
/// Returns `None` when nothing is left to pay.
pub fn row_to_bill(
    module: ModuleType,
    row: BillRow,
    penalty: &dyn PenaltyCalculator,
    as_of: NaiveDate,
) -> Result<Option<Bill>, PortError> {
    let invalid = |e: core_kernel::MoneyError| {
        PortError::internal(format!("{} bill {}: {}", module, row.period, e))
    };
    let base = row.base_outstanding().map_err(invalid)?;
    let penalty_due = row.penalty_outstanding(penalty, as_of).map_err(invalid)?;

    if base.is_negative() {
        return Err(PortError::internal(format!(
            "{} bill {} is overpaid by {}",
            module,
            row.period,
            MinorUnits::ZERO.checked_sub(base).map_err(invalid)?
        )));
    }
    if base.is_zero() && penalty_due.is_zero() {
        return Ok(None);
    }

    let mut bill = Bill::new(module, row.period, row.due_date, base).with_penalty(penalty_due);
    bill.description = row.description;
    Ok(Some(bill))
}

/// PostgreSQL-backed bill source for one module
#[derive(Clone)]
pub struct PostgresBillSource {
    repository: BillRepository,
    pool: PgPool,
    module: ModuleType,
    penalty: Arc<dyn PenaltyCalculator>,
}

impl PostgresBillSource {
    pub fn new(pool: PgPool, module: ModuleType, penalty: Arc<dyn PenaltyCalculator>) -> Self {
        Self {
            repository: BillRepository::new(pool.clone()),
            pool,
            module,
            penalty,
        }
    }
}

impl std::fmt::Debug for PostgresBillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBillSource")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl DomainPort for PostgresBillSource {}

#[async_trait]
impl HealthCheckable for PostgresBillSource {
    async fn health_check(&self) -> HealthCheckResult {
        pool_health(&self.pool, &format!("postgres-{}-bills", self.module)).await
    }
}

#[async_trait]
impl BillSourcePort for PostgresBillSource {
    fn module(&self) -> ModuleType {
        self.module
    }

    #[instrument(skip(self, unit), fields(module = %self.module, unit = %unit))]
    async fn fetch_unpaid_bills(
        &self,
        unit: &UnitRef,
        as_of: NaiveDate,
    ) -> Result<Vec<Bill>, PortError> {
        let rows = self
            .repository
            .find_open(self.module, unit)
            .await
            .map_err(db_to_port_error)?;

        let mut bills = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(bill) = row_to_bill(self.module, row, self.penalty.as_ref(), as_of)? {
                bills.push(bill);
            }
        }

        debug!(count = bills.len(), "Fetched unpaid bills");
        Ok(bills)
    }
}

/// PostgreSQL-backed unit accounts
#[derive(Debug, Clone)]
pub struct PostgresUnitAccountAdapter {
    repository: UnitAccountRepository,
    pool: PgPool,
}

impl PostgresUnitAccountAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: UnitAccountRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PostgresUnitAccountAdapter {}

#[async_trait]
impl HealthCheckable for PostgresUnitAccountAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        pool_health(&self.pool, "postgres-unit-accounts").await
    }
}

#[async_trait]
impl UnitAccountPort for PostgresUnitAccountAdapter {
    #[instrument(skip(self, unit), fields(unit = %unit))]
    async fn unit_exists(&self, unit: &UnitRef) -> Result<bool, PortError> {
        let row = self.repository.find(unit).await.map_err(db_to_port_error)?;
        Ok(row.is_some())
    }

    #[instrument(skip(self, unit), fields(unit = %unit))]
    async fn fetch_credit_balance(&self, unit: &UnitRef) -> Result<MinorUnits, PortError> {
        let row = self.repository.get(unit).await.map_err(db_to_port_error)?;
        if row.credit_balance < 0 {
            return Err(PortError::internal(format!(
                "unit {} has negative credit {}",
                unit, row.credit_balance
            )));
        }
        Ok(MinorUnits::new(row.credit_balance))
    }

    #[instrument(skip(self, client), fields(client = %client))]
    async fn fetch_fiscal_year_start(
        &self,
        client: &ClientId,
    ) -> Result<FiscalYearStart, PortError> {
        let month = self
            .repository
            .fiscal_year_start_month(client)
            .await
            .map_err(db_to_port_error)?;

        u32::try_from(month)
            .map_err(|e| e.to_string())
            .and_then(|m| FiscalYearStart::new(m).map_err(|e| e.to_string()))
            .map_err(|e| PortError::internal(format!("client {} fiscal year: {}", client, e)))
    }
}

/// PostgreSQL-backed payment ledger
///
/// A commit locks the unit row and every bill it touches, re-checks the
/// balances against the transaction, then writes bills, lines, credit entry
/// and transaction record in one database transaction. Any mismatch rolls the
/// whole transaction back and surfaces as `PortError::Conflict`.
#[derive(Debug, Clone)]
pub struct PostgresPaymentLedger {
    repository: PaymentRepository,
    pool: PgPool,
    penalties: ModulePenalties,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool, penalties: ModulePenalties) -> Self {
        Self {
            repository: PaymentRepository::new(pool.clone()),
            pool,
            penalties,
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &PaymentRepository {
        &self.repository
    }

    async fn record(
        &self,
        transaction: &PaymentTransaction,
        metadata: Option<&OperationMetadata>,
    ) -> Result<CommitReceipt, DatabaseError> {
        let unit = &transaction.unit;
        let entry = &transaction.credit_entry;
        let mut tx = self.pool.begin().await?;

        let balance = UnitAccountRepository::lock_credit(&mut *tx, unit).await?;
        if balance != entry.previous_balance.value() {
            return Err(DatabaseError::Conflict(format!(
                "credit for {} is {}, transaction expects {}",
                unit, balance, entry.previous_balance
            )));
        }

        PaymentRepository::insert_transaction(&mut *tx, transaction, metadata).await?;

        for module in ModuleType::ALL {
            let calculator = self.penalties.for_module(module);
            for line in &transaction.module(module).lines {
                let row = BillRepository::lock_for_update(&mut *tx, module, unit, &line.period)
                    .await?
                    .ok_or_else(|| {
                        DatabaseError::Conflict(format!(
                            "{} bill {} for {} no longer exists",
                            module, line.period, unit
                        ))
                    })?;
                let settlement = BillSettlement::settle(
                    &row,
                    line.base_paid,
                    line.penalty_paid,
                    calculator,
                    transaction.as_of_date,
                )?;
                BillRepository::apply_payment(&mut *tx, module, unit, &settlement).await?;
                PaymentRepository::insert_line(&mut *tx, transaction, module, line).await?;
            }
        }

        PaymentRepository::insert_credit_entry(&mut *tx, unit, entry).await?;
        UnitAccountRepository::set_credit(&mut *tx, unit, entry.new_balance.value()).await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(CommitReceipt {
            transaction_id: transaction.id,
            bills_updated: transaction.bills_updated(),
            credit_balance: entry.new_balance,
            committed_at: Utc::now(),
        })
    }
}

impl DomainPort for PostgresPaymentLedger {}

#[async_trait]
impl HealthCheckable for PostgresPaymentLedger {
    async fn health_check(&self) -> HealthCheckResult {
        pool_health(&self.pool, "postgres-payment-ledger").await
    }
}

#[async_trait]
impl PaymentLedgerPort for PostgresPaymentLedger {
    #[instrument(skip(self, transaction, metadata), fields(transaction_id = %transaction.id, unit = %transaction.unit))]
    async fn commit_payment(
        &self,
        transaction: &PaymentTransaction,
        metadata: Option<OperationMetadata>,
    ) -> Result<CommitReceipt, PortError> {
        match self.record(transaction, metadata.as_ref()).await {
            Ok(receipt) => {
                info!(
                    bills_updated = receipt.bills_updated,
                    credit_balance = %receipt.credit_balance,
                    "Payment committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(error = %e, "Payment commit rolled back");
                Err(db_to_port_error(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(base_amount: i64, base_paid: i64, assessed: i64, penalty_paid: i64) -> BillRow {
        BillRow {
            period: "2026-03".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            base_amount,
            base_paid,
            penalty_assessed: assessed,
            penalty_paid,
            description: Some("Water consumption March".to_string()),
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 15).unwrap()
    }

    #[test]
    fn test_row_to_bill_uses_outstanding_amounts() {
        let bill = row_to_bill(ModuleType::Utility, row(3000, 1000, 300, 0), &NoPenalty, as_of())
            .unwrap()
            .unwrap();

        assert_eq!(bill.module, ModuleType::Utility);
        assert_eq!(bill.period, "2026-03");
        assert_eq!(bill.base_amount_due, MinorUnits::new(2000));
        assert_eq!(bill.penalty_amount_due, MinorUnits::new(300));
        assert_eq!(bill.description.as_deref(), Some("Water consumption March"));
    }

    #[test]
    fn test_settled_row_is_skipped() {
        let bill = row_to_bill(ModuleType::Dues, row(3000, 3000, 300, 300), &NoPenalty, as_of())
            .unwrap();
        assert!(bill.is_none());
    }

    #[test]
    fn test_overpaid_row_is_an_error() {
        let result = row_to_bill(ModuleType::Dues, row(3000, 3500, 0, 0), &NoPenalty, as_of());
        assert!(result.is_err());
    }

    #[test]
    fn test_penalties_per_module() {
        let penalties = ModulePenalties::none();
        let penalty = penalties
            .for_module(ModuleType::Dues)
            .penalty_as_of(MinorUnits::new(1000), as_of(), as_of())
            .unwrap();
        assert_eq!(penalty, MinorUnits::ZERO);
    }
}
