//! Payment repository implementation
//!
//! Records committed payment transactions, their per-bill lines and the
//! matching credit ledger entry. All writes take a connection so they join the
//! caller's transaction.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use core_kernel::{OperationMetadata, UnitRef};
use domain_billing::{BillPaymentLine, CreditLedgerEntry, ModuleType, PaymentTransaction};

use crate::error::DatabaseError;
use crate::repositories::bills::status_label;

/// Summary row of a recorded payment
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PaymentRow {
    pub transaction_id: Uuid,
    pub client_id: String,
    pub unit_id: String,
    pub method: String,
    pub incoming_payment: i64,
    pub total_allocated: i64,
    pub created_at: DateTime<Utc>,
}

/// Repository for payment transactions and credit movements
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lists a unit's payments, newest first
    pub async fn list_for_unit(&self, unit: &UnitRef) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT transaction_id, client_id, unit_id, method,
                   incoming_payment, total_allocated, created_at
            FROM payment_transactions
            WHERE client_id = $1 AND unit_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(unit.client_id.as_str())
        .bind(unit.unit_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Inserts the transaction header
    pub async fn insert_transaction(
        conn: &mut PgConnection,
        transaction: &PaymentTransaction,
        metadata: Option<&OperationMetadata>,
    ) -> Result<(), DatabaseError> {
        let payment = &transaction.payment;
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                transaction_id, client_id, unit_id, as_of_date, method, reference,
                received_on, notes, incoming_payment, total_allocated,
                correlation_id, initiated_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(*transaction.id.as_uuid())
        .bind(transaction.unit.client_id.as_str())
        .bind(transaction.unit.unit_id.as_str())
        .bind(transaction.as_of_date)
        .bind(payment.method.as_str())
        .bind(payment.reference.as_deref())
        .bind(payment.received_on)
        .bind(payment.notes.as_deref())
        .bind(transaction.incoming_payment.value())
        .bind(transaction.total_allocated.value())
        .bind(metadata.and_then(|m| m.correlation_id.as_deref()))
        .bind(metadata.and_then(|m| m.initiated_by.as_deref()))
        .bind(transaction.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts one per-bill payment line
    pub async fn insert_line(
        conn: &mut PgConnection,
        transaction: &PaymentTransaction,
        module: ModuleType,
        line: &BillPaymentLine,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO bill_payments (
                transaction_id, module, period, base_paid, penalty_paid,
                amount_paid, new_status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*transaction.id.as_uuid())
        .bind(module.as_str())
        .bind(&line.period)
        .bind(line.base_paid.value())
        .bind(line.penalty_paid.value())
        .bind(line.amount_paid.value())
        .bind(status_label(line.new_status))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts the credit ledger entry of a transaction
    pub async fn insert_credit_entry(
        conn: &mut PgConnection,
        unit: &UnitRef,
        entry: &CreditLedgerEntry,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO credit_ledger_entries (
                entry_id, transaction_id, client_id, unit_id, previous_balance,
                used, added, new_balance, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.transaction_id.as_uuid())
        .bind(unit.client_id.as_str())
        .bind(unit.unit_id.as_str())
        .bind(entry.previous_balance.value())
        .bind(entry.used.value())
        .bind(entry.added.value())
        .bind(entry.new_balance.value())
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
