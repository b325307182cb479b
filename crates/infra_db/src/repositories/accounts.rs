//! Unit account repository
//!
//! Units, their credit balance and the fiscal calendar of the client that
//! owns them.

use sqlx::{FromRow, PgConnection, PgPool};

use core_kernel::{ClientId, UnitRef};

use crate::error::DatabaseError;

/// Database row for a unit account
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UnitAccountRow {
    pub client_id: String,
    pub unit_id: String,
    pub credit_balance: i64,
}

/// Repository for unit accounts
#[derive(Debug, Clone)]
pub struct UnitAccountRepository {
    pool: PgPool,
}

impl UnitAccountRepository {
    /// Creates a new UnitAccountRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds a unit account
    pub async fn find(&self, unit: &UnitRef) -> Result<Option<UnitAccountRow>, DatabaseError> {
        let row = sqlx::query_as::<_, UnitAccountRow>(
            r#"
            SELECT client_id, unit_id, credit_balance
            FROM units
            WHERE client_id = $1 AND unit_id = $2
            "#,
        )
        .bind(unit.client_id.as_str())
        .bind(unit.unit_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Gets a unit account, failing when it does not exist
    pub async fn get(&self, unit: &UnitRef) -> Result<UnitAccountRow, DatabaseError> {
        self.find(unit)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Unit", unit))
    }

    /// Month the client's fiscal year starts in
    pub async fn fiscal_year_start_month(&self, client: &ClientId) -> Result<i16, DatabaseError> {
        let month = sqlx::query_scalar::<_, i16>(
            "SELECT fiscal_year_start_month FROM clients WHERE client_id = $1",
        )
        .bind(client.as_str())
        .fetch_optional(&self.pool)
        .await?;

        month.ok_or_else(|| DatabaseError::not_found("Client", client))
    }

    /// Locks the unit row and returns its credit balance
    pub async fn lock_credit(conn: &mut PgConnection, unit: &UnitRef) -> Result<i64, DatabaseError> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT credit_balance
            FROM units
            WHERE client_id = $1 AND unit_id = $2
            FOR UPDATE
            "#,
        )
        .bind(unit.client_id.as_str())
        .bind(unit.unit_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        balance.ok_or_else(|| DatabaseError::not_found("Unit", unit))
    }

    /// Sets the credit balance of a locked unit row
    pub async fn set_credit(
        conn: &mut PgConnection,
        unit: &UnitRef,
        balance: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE units SET credit_balance = $3 WHERE client_id = $1 AND unit_id = $2")
            .bind(unit.client_id.as_str())
            .bind(unit.unit_id.as_str())
            .bind(balance)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
