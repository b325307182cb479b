//! Ports the distribution engine depends on
//!
//! Each billing module exposes its unpaid bills through a [`BillSourcePort`].
//! Unit accounts (existence, credit, fiscal calendar) come from a
//! [`UnitAccountPort`], and committed payments are written through a
//! [`PaymentLedgerPort`] that must apply every module's updates and the credit
//! movement atomically.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    ClientId, DomainPort, FiscalYearStart, HealthCheckable, MinorUnits, OperationMetadata,
    PortError, TransactionId, UnitRef,
};
use crate::bill::{Bill, ModuleType};
use crate::transaction::PaymentTransaction;

/// Source of unpaid bills for one billing module
#[async_trait]
pub trait BillSourcePort: DomainPort + HealthCheckable {
    /// The module this source serves
    fn module(&self) -> ModuleType;

    /// Fetches the unit's bills that still have a balance
    ///
    /// # Arguments
    ///
    /// * `unit` - The unit whose bills are requested
    /// * `as_of` - Date the penalty amounts are calculated for
    ///
    /// # Returns
    ///
    /// Every bill with a positive outstanding balance, in any order. Bills not
    /// yet due are included; the engine decides which are payable.
    async fn fetch_unpaid_bills(
        &self,
        unit: &UnitRef,
        as_of: NaiveDate,
    ) -> Result<Vec<Bill>, PortError>;
}

/// Unit account data shared by both modules
#[async_trait]
pub trait UnitAccountPort: DomainPort + HealthCheckable {
    /// Returns whether the unit exists under the client
    async fn unit_exists(&self, unit: &UnitRef) -> Result<bool, PortError>;

    /// Returns the unit's current credit balance
    async fn fetch_credit_balance(&self, unit: &UnitRef) -> Result<MinorUnits, PortError>;

    /// Returns the month the client's fiscal year starts in
    async fn fetch_fiscal_year_start(&self, client: &ClientId)
        -> Result<FiscalYearStart, PortError>;
}

/// Outcome of a persisted payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub transaction_id: TransactionId,
    pub bills_updated: usize,
    pub credit_balance: MinorUnits,
    pub committed_at: DateTime<Utc>,
}

/// Persists committed payments
#[async_trait]
pub trait PaymentLedgerPort: DomainPort + HealthCheckable {
    /// Applies a payment transaction atomically
    ///
    /// All bill updates in both modules, the credit ledger entry and the
    /// transaction record are written together or not at all. Implementations
    /// must reject the transaction with `PortError::Conflict` when a bill no
    /// longer has the balance being paid or the credit balance has moved.
    async fn commit_payment(
        &self,
        transaction: &PaymentTransaction,
        metadata: Option<OperationMetadata>,
    ) -> Result<CommitReceipt, PortError>;
}

/// In-memory implementation of the billing ports for testing
///
/// One store backs both bill sources, the unit accounts and the payment
/// ledger, so a commit under its write lock is atomic across modules.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::RwLock;

    use core_kernel::{AdapterHealth, HealthCheckResult};
    use crate::error::DistributionError;
    use crate::ledger::CreditLedger;

    #[derive(Debug, Default)]
    struct StoreState {
        accounts: BTreeMap<UnitRef, CreditLedger>,
        fiscal_years: BTreeMap<ClientId, FiscalYearStart>,
        bills: BTreeMap<(UnitRef, ModuleType), Vec<Bill>>,
        transactions: Vec<PaymentTransaction>,
        failing: BTreeSet<ModuleType>,
        delays: BTreeMap<ModuleType, Duration>,
    }

    /// Shared in-memory billing data
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryBillingStore {
        state: Arc<RwLock<StoreState>>,
    }

    impl InMemoryBillingStore {
        /// Creates an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a unit with an opening credit balance
        pub async fn add_unit(&self, unit: UnitRef, credit: MinorUnits) {
            self.state
                .write()
                .await
                .accounts
                .insert(unit, CreditLedger::with_opening_balance(credit));
        }

        pub async fn set_fiscal_year_start(&self, client: ClientId, start: FiscalYearStart) {
            self.state.write().await.fiscal_years.insert(client, start);
        }

        /// Adds an outstanding bill, registering the unit if needed
        pub async fn add_bill(&self, unit: &UnitRef, bill: Bill) {
            let mut state = self.state.write().await;
            state.accounts.entry(unit.clone()).or_default();
            state
                .bills
                .entry((unit.clone(), bill.module))
                .or_default()
                .push(bill);
        }

        /// Makes the module's bill source fail until restored
        pub async fn fail_module(&self, module: ModuleType) {
            self.state.write().await.failing.insert(module);
        }

        pub async fn restore_module(&self, module: ModuleType) {
            let mut state = self.state.write().await;
            state.failing.remove(&module);
            state.delays.remove(&module);
        }

        /// Delays every fetch from the module's bill source
        pub async fn delay_module(&self, module: ModuleType, delay: Duration) {
            self.state.write().await.delays.insert(module, delay);
        }

        /// Reduces a bill's base balance as if paid through another channel
        pub async fn apply_external_payment(
            &self,
            unit: &UnitRef,
            module: ModuleType,
            period: &str,
            amount: MinorUnits,
        ) -> Result<(), PortError> {
            let mut state = self.state.write().await;
            let bill = state
                .bills
                .get_mut(&(unit.clone(), module))
                .and_then(|bills| bills.iter_mut().find(|b| b.period == period))
                .ok_or_else(|| PortError::not_found("Bill", format!("{}:{}", module, period)))?;
            bill.base_amount_due = bill
                .base_amount_due
                .checked_sub(amount.min(bill.base_amount_due))
                .map_err(|e| PortError::internal(e.to_string()))?;
            Ok(())
        }

        /// Sets a unit's credit balance directly, bypassing the ledger
        pub async fn overwrite_credit(&self, unit: &UnitRef, credit: MinorUnits) {
            self.state
                .write()
                .await
                .accounts
                .insert(unit.clone(), CreditLedger::with_opening_balance(credit));
        }

        pub async fn credit_balance(&self, unit: &UnitRef) -> Option<MinorUnits> {
            self.state.read().await.accounts.get(unit).map(CreditLedger::balance)
        }

        /// The bill as currently stored, if it still exists
        pub async fn bill(&self, unit: &UnitRef, module: ModuleType, period: &str) -> Option<Bill> {
            self.state
                .read()
                .await
                .bills
                .get(&(unit.clone(), module))
                .and_then(|bills| bills.iter().find(|b| b.period == period).cloned())
        }

        pub async fn transactions(&self) -> Vec<PaymentTransaction> {
            self.state.read().await.transactions.clone()
        }

        /// A bill source reading this store's bills for one module
        pub fn bill_source(&self, module: ModuleType) -> InMemoryBillSource {
            InMemoryBillSource {
                store: self.clone(),
                module,
            }
        }
    }

    fn healthy(adapter_id: &str) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: adapter_id.to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("In-memory adapter always healthy".to_string()),
            checked_at: Utc::now(),
        }
    }

    impl DomainPort for InMemoryBillingStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryBillingStore {
        async fn health_check(&self) -> HealthCheckResult {
            healthy("in-memory-billing-store")
        }
    }

    #[async_trait]
    impl UnitAccountPort for InMemoryBillingStore {
        async fn unit_exists(&self, unit: &UnitRef) -> Result<bool, PortError> {
            Ok(self.state.read().await.accounts.contains_key(unit))
        }

        async fn fetch_credit_balance(&self, unit: &UnitRef) -> Result<MinorUnits, PortError> {
            self.state
                .read()
                .await
                .accounts
                .get(unit)
                .map(CreditLedger::balance)
                .ok_or_else(|| PortError::not_found("Unit", unit))
        }

        async fn fetch_fiscal_year_start(
            &self,
            client: &ClientId,
        ) -> Result<FiscalYearStart, PortError> {
            Ok(self
                .state
                .read()
                .await
                .fiscal_years
                .get(client)
                .copied()
                .unwrap_or_default())
        }
    }

    #[async_trait]
    impl PaymentLedgerPort for InMemoryBillingStore {
        async fn commit_payment(
            &self,
            transaction: &PaymentTransaction,
            _metadata: Option<OperationMetadata>,
        ) -> Result<CommitReceipt, PortError> {
            let mut state = self.state.write().await;
            let unit = &transaction.unit;

            let ledger = state
                .accounts
                .get(unit)
                .ok_or_else(|| PortError::not_found("Unit", unit))?;
            ledger
                .check(&transaction.credit_entry)
                .map_err(|e| match e {
                    DistributionError::CreditBalanceMismatch { .. } => PortError::conflict(e.to_string()),
                    other => PortError::internal(other.to_string()),
                })?;

            // Validate every line before touching anything
            for module in ModuleType::ALL {
                let bills = state.bills.get(&(unit.clone(), module));
                for line in &transaction.module(module).lines {
                    let bill = bills
                        .and_then(|bills| bills.iter().find(|b| b.period == line.period))
                        .ok_or_else(|| {
                            PortError::conflict(format!("{} bill {} is no longer open", module, line.period))
                        })?;
                    if line.base_paid > bill.base_amount_due
                        || line.penalty_paid > bill.penalty_amount_due
                    {
                        return Err(PortError::conflict(format!(
                            "{} bill {} balance changed",
                            module, line.period
                        )));
                    }
                }
            }

            for module in ModuleType::ALL {
                let Some(bills) = state.bills.get_mut(&(unit.clone(), module)) else {
                    continue;
                };
                for line in &transaction.module(module).lines {
                    if let Some(bill) = bills.iter_mut().find(|b| b.period == line.period) {
                        bill.base_amount_due = bill
                            .base_amount_due
                            .checked_sub(line.base_paid)
                            .map_err(|e| PortError::internal(e.to_string()))?;
                        bill.penalty_amount_due = bill
                            .penalty_amount_due
                            .checked_sub(line.penalty_paid)
                            .map_err(|e| PortError::internal(e.to_string()))?;
                    }
                }
                bills.retain(|b| b.base_amount_due.is_positive() || b.penalty_amount_due.is_positive());
            }

            let ledger = state
                .accounts
                .get_mut(unit)
                .ok_or_else(|| PortError::not_found("Unit", unit))?;
            ledger
                .post(transaction.credit_entry.clone())
                .map_err(|e| PortError::internal(e.to_string()))?;
            let credit_balance = ledger.balance();

            state.transactions.push(transaction.clone());

            Ok(CommitReceipt {
                transaction_id: transaction.id,
                bills_updated: transaction.bills_updated(),
                credit_balance,
                committed_at: Utc::now(),
            })
        }
    }

    /// One module's view of an [`InMemoryBillingStore`]
    #[derive(Debug, Clone)]
    pub struct InMemoryBillSource {
        store: InMemoryBillingStore,
        module: ModuleType,
    }

    impl DomainPort for InMemoryBillSource {}

    #[async_trait]
    impl HealthCheckable for InMemoryBillSource {
        async fn health_check(&self) -> HealthCheckResult {
            let failing = self.store.state.read().await.failing.contains(&self.module);
            let mut result = healthy(&format!("in-memory-{}-source", self.module));
            if failing {
                result.status = AdapterHealth::Unhealthy;
                result.message = Some("Simulated outage".to_string());
            }
            result
        }
    }

    #[async_trait]
    impl BillSourcePort for InMemoryBillSource {
        fn module(&self) -> ModuleType {
            self.module
        }

        async fn fetch_unpaid_bills(
            &self,
            unit: &UnitRef,
            _as_of: NaiveDate,
        ) -> Result<Vec<Bill>, PortError> {
            let delay = {
                let state = self.store.state.read().await;
                if state.failing.contains(&self.module) {
                    return Err(PortError::ServiceUnavailable {
                        service: format!("{} bill source", self.module),
                    });
                }
                state.delays.get(&self.module).copied()
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let state = self.store.state.read().await;
            Ok(state
                .bills
                .get(&(unit.clone(), self.module))
                .map(|bills| {
                    bills
                        .iter()
                        .filter(|b| b.base_amount_due.is_positive() || b.penalty_amount_due.is_positive())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }
}
