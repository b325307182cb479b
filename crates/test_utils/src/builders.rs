//! Test Data Builders
//!
//! Provides builder patterns for bills and for a fully wired engine backed by
//! the in-memory adapters. Tests specify only what matters to them and take
//! defaults for everything else.

use chrono::NaiveDate;
use std::sync::Arc;

use core_kernel::{FiscalYearStart, MinorUnits, UnitRef};
use domain_billing::ports::mock::InMemoryBillingStore;
use domain_billing::{
    Bill, BillSources, CommitGuard, DistributionEngine, EngineConfig, ModuleType,
};

use crate::fixtures::{DateFixtures, UnitFixtures};

/// Builder for a single bill
pub struct BillBuilder {
    module: ModuleType,
    period: String,
    due_date: NaiveDate,
    base: MinorUnits,
    penalty: MinorUnits,
    description: Option<String>,
}

impl BillBuilder {
    /// Starts a dues bill due on the as-of date
    pub fn dues(period: impl Into<String>) -> Self {
        Self::new(ModuleType::Dues, period)
    }

    /// Starts a utility bill due on the as-of date
    pub fn utility(period: impl Into<String>) -> Self {
        Self::new(ModuleType::Utility, period)
    }

    pub fn new(module: ModuleType, period: impl Into<String>) -> Self {
        Self {
            module,
            period: period.into(),
            due_date: DateFixtures::as_of(),
            base: MinorUnits::new(1_000),
            penalty: MinorUnits::ZERO,
            description: None,
        }
    }

    /// Sets the due date
    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = date;
        self
    }

    /// Sets the base amount in minor units
    pub fn base(mut self, minor: i64) -> Self {
        self.base = MinorUnits::new(minor);
        self
    }

    /// Sets the penalty in minor units
    pub fn penalty(mut self, minor: i64) -> Self {
        self.penalty = MinorUnits::new(minor);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self) -> Bill {
        let bill = Bill::new(self.module, self.period, self.due_date, self.base)
            .with_penalty(self.penalty);
        match self.description {
            Some(description) => bill.with_description(description),
            None => bill,
        }
    }
}

/// An engine, commit guard and the store behind both
pub struct TestHarness {
    pub store: InMemoryBillingStore,
    pub engine: Arc<DistributionEngine>,
    pub guard: Arc<CommitGuard>,
    pub unit: UnitRef,
}

/// Builder for a [`TestHarness`]
pub struct TestHarnessBuilder {
    unit: UnitRef,
    credit: MinorUnits,
    fiscal_year_start: FiscalYearStart,
    bills: Vec<Bill>,
    config: EngineConfig,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarnessBuilder {
    /// Creates a builder for the reference unit with no credit and no bills
    pub fn new() -> Self {
        Self {
            unit: UnitFixtures::unit(),
            credit: MinorUnits::ZERO,
            fiscal_year_start: DateFixtures::fiscal_year_start(),
            bills: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_unit(mut self, unit: UnitRef) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the opening credit balance in minor units
    pub fn with_credit(mut self, minor: i64) -> Self {
        self.credit = MinorUnits::new(minor);
        self
    }

    pub fn with_fiscal_year_start(mut self, start: FiscalYearStart) -> Self {
        self.fiscal_year_start = start;
        self
    }

    pub fn with_bill(mut self, bill: Bill) -> Self {
        self.bills.push(bill);
        self
    }

    pub fn with_bills(mut self, bills: impl IntoIterator<Item = Bill>) -> Self {
        self.bills.extend(bills);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seeds the store and wires the engine and guard to it
    pub async fn build(self) -> TestHarness {
        let store = InMemoryBillingStore::new();
        store.add_unit(self.unit.clone(), self.credit).await;
        store
            .set_fiscal_year_start(self.unit.client_id.clone(), self.fiscal_year_start)
            .await;
        for bill in self.bills {
            store.add_bill(&self.unit, bill).await;
        }

        let sources = BillSources::new(
            Arc::new(store.bill_source(ModuleType::Dues)),
            Arc::new(store.bill_source(ModuleType::Utility)),
        );
        let engine = Arc::new(DistributionEngine::new(
            sources,
            Arc::new(store.clone()),
            self.config,
        ));
        let guard = Arc::new(CommitGuard::new(engine.clone(), Arc::new(store.clone())));

        TestHarness {
            store,
            engine,
            guard,
            unit: self.unit,
        }
    }
}
