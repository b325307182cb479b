//! Domain Adapters
//!
//! Adapter implementations for the billing ports, connecting them to the
//! PostgreSQL database layer.
//!
//! Each adapter:
//! - Implements a port trait from `domain_billing`
//! - Translates between row types and domain models
//! - Uses the repository layer for database operations
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresUnitAccountAdapter;
//! use domain_billing::UnitAccountPort;
//!
//! let accounts = PostgresUnitAccountAdapter::new(pool);
//! let credit = accounts.fetch_credit_balance(&unit).await?;
//! ```

pub mod billing;

pub use billing::{
    row_to_bill, ModulePenalties, PostgresBillSource, PostgresPaymentLedger,
    PostgresUnitAccountAdapter,
};
