//! Core Kernel - Foundational types for the property billing system
//!
//! This crate provides the building blocks shared by every other crate:
//! - Exact integer money in minor currency units
//! - Fiscal calendar and timezone helpers
//! - Client, unit and transaction identifiers
//! - The port error type and health-check traits adapters implement

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Currency, MinorUnits, MoneyError, Rate};
pub use temporal::{FiscalYearStart, TemporalError, Timezone};
pub use identifiers::{ClientId, CreditLedgerEntryId, TransactionId, UnitId, UnitRef};
pub use ports::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, OperationMetadata, PortError,
};
pub use error::CoreError;
