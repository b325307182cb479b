//! Repository implementations for billing data
//!
//! Repositories encapsulate SQL queries and map between database rows and
//! row types. Read queries run on the pool; writes that belong to a payment
//! commit take a `PgConnection` so the caller decides the transaction.

pub mod accounts;
pub mod bills;
pub mod payments;

pub use accounts::{UnitAccountRepository, UnitAccountRow};
pub use bills::{BillRepository, BillRow, BillSettlement};
pub use payments::{PaymentRepository, PaymentRow};
