//! Infrastructure Database Layer
//!
//! PostgreSQL storage for the payment distribution engine, built on SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: repositories own the SQL and row
//! types, and adapters implement the `domain_billing` ports on top of them.
//!
//! - Dues and water bills are kept in separate tables, one bill source each
//! - Unit accounts carry the credit balance; clients carry the fiscal calendar
//! - A payment commit locks the unit and its bills and writes everything in
//!   one database transaction
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//! use infra_db::adapters::PostgresUnitAccountAdapter;
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/payments")).await?;
//! run_migrations(&pool).await?;
//! let accounts = PostgresUnitAccountAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::{db_to_port_error, DatabaseError};
pub use adapters::{
    ModulePenalties, PostgresBillSource, PostgresPaymentLedger, PostgresUnitAccountAdapter,
};
