//! Bill repository implementation
//!
//! Dues and water bills live in separate tables with the same shape. Each row
//! tracks what was charged and what has been paid; the open balance is derived
//! when the row is read.

use chrono::NaiveDate;
use sqlx::{FromRow, PgConnection, PgPool};

use core_kernel::{MinorUnits, MoneyError, UnitRef};
use domain_billing::{BillStatus, ModuleType, PenaltyCalculator};

use crate::error::DatabaseError;

/// Table holding a module's bills
pub fn bill_table(module: ModuleType) -> &'static str {
    match module {
        ModuleType::Dues => "dues_bills",
        ModuleType::Utility => "utility_bills",
    }
}

/// Stored status label for a bill
pub fn status_label(status: BillStatus) -> &'static str {
    match status {
        BillStatus::Unpaid => "unpaid",
        BillStatus::Partial => "partial",
        BillStatus::Paid => "paid",
    }
}

/// Database row for a dues or water bill
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BillRow {
    pub period: String,
    pub due_date: NaiveDate,
    pub base_amount: i64,
    pub base_paid: i64,
    /// Penalties already charged to the bill
    pub penalty_assessed: i64,
    pub penalty_paid: i64,
    pub description: Option<String>,
}

impl BillRow {
    /// Base charge still owed
    pub fn base_outstanding(&self) -> Result<MinorUnits, MoneyError> {
        MinorUnits::new(self.base_amount).checked_sub(MinorUnits::new(self.base_paid))
    }

    /// Penalty charged so far plus what has accrued on the open base
    pub fn penalty_total(
        &self,
        penalty: &dyn PenaltyCalculator,
        as_of: NaiveDate,
    ) -> Result<MinorUnits, MoneyError> {
        let accrued = penalty.penalty_as_of(self.base_outstanding()?, self.due_date, as_of)?;
        MinorUnits::new(self.penalty_assessed).checked_add(accrued)
    }

    /// Penalty still owed as of the date, never negative
    pub fn penalty_outstanding(
        &self,
        penalty: &dyn PenaltyCalculator,
        as_of: NaiveDate,
    ) -> Result<MinorUnits, MoneyError> {
        let total = self.penalty_total(penalty, as_of)?;
        let paid = MinorUnits::new(self.penalty_paid);
        total.checked_sub(paid.min(total))
    }
}

/// Repository for reading and settling module bills
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: PgPool,
}

impl BillRepository {
    /// Creates a new BillRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetches the unit's bills that are not marked paid
    ///
    /// Rows are ordered by due date; callers still filter on the computed
    /// balance since accrued penalties are not stored.
    pub async fn find_open(
        &self,
        module: ModuleType,
        unit: &UnitRef,
    ) -> Result<Vec<BillRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT period, due_date, base_amount, base_paid,
                   penalty_assessed, penalty_paid, description
            FROM {}
            WHERE client_id = $1 AND unit_id = $2 AND status <> 'paid'
            ORDER BY due_date, period
            "#,
            bill_table(module)
        );

        let rows = sqlx::query_as::<_, BillRow>(&sql)
            .bind(unit.client_id.as_str())
            .bind(unit.unit_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Locks one bill row for the rest of the transaction
    pub async fn lock_for_update(
        conn: &mut PgConnection,
        module: ModuleType,
        unit: &UnitRef,
        period: &str,
    ) -> Result<Option<BillRow>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT period, due_date, base_amount, base_paid,
                   penalty_assessed, penalty_paid, description
            FROM {}
            WHERE client_id = $1 AND unit_id = $2 AND period = $3
            FOR UPDATE
            "#,
            bill_table(module)
        );

        let row = sqlx::query_as::<_, BillRow>(&sql)
            .bind(unit.client_id.as_str())
            .bind(unit.unit_id.as_str())
            .bind(period)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row)
    }

    /// Writes new paid totals and status for a locked bill
    pub async fn apply_payment(
        conn: &mut PgConnection,
        module: ModuleType,
        unit: &UnitRef,
        settlement: &BillSettlement,
    ) -> Result<(), DatabaseError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET base_paid = $4, penalty_paid = $5, penalty_assessed = $6, status = $7
            WHERE client_id = $1 AND unit_id = $2 AND period = $3
            "#,
            bill_table(module)
        );

        let result = sqlx::query(&sql)
            .bind(unit.client_id.as_str())
            .bind(unit.unit_id.as_str())
            .bind(&settlement.period)
            .bind(settlement.base_paid)
            .bind(settlement.penalty_paid)
            .bind(settlement.penalty_assessed)
            .bind(status_label(settlement.status))
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() != 1 {
            return Err(DatabaseError::Conflict(format!(
                "{} bill {} for {} changed during commit",
                module, settlement.period, unit
            )));
        }
        Ok(())
    }
}

/// New stored totals for a bill after a payment line is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillSettlement {
    pub period: String,
    pub base_paid: i64,
    pub penalty_paid: i64,
    pub penalty_assessed: i64,
    pub status: BillStatus,
}

impl BillSettlement {
    /// Applies a payment to a locked row
    ///
    /// Accrued penalty becomes assessed once the base is settled, so it keeps
    /// being owed after accrual on the base stops. Returns a conflict when the
    /// line pays more than the row still owes.
    pub fn settle(
        row: &BillRow,
        base: MinorUnits,
        penalty: MinorUnits,
        calculator: &dyn PenaltyCalculator,
        as_of: NaiveDate,
    ) -> Result<Self, DatabaseError> {
        let money = |e: MoneyError| DatabaseError::InvalidData(e.to_string());

        let base_open = row.base_outstanding().map_err(money)?;
        if base > base_open {
            return Err(DatabaseError::Conflict(format!(
                "bill {} has {} base outstanding, payment applies {}",
                row.period, base_open, base
            )));
        }
        let penalty_total = row.penalty_total(calculator, as_of).map_err(money)?;
        let penalty_open = row.penalty_outstanding(calculator, as_of).map_err(money)?;
        if penalty > penalty_open {
            return Err(DatabaseError::Conflict(format!(
                "bill {} has {} penalty outstanding, payment applies {}",
                row.period, penalty_open, penalty
            )));
        }

        let base_paid = MinorUnits::new(row.base_paid).checked_add(base).map_err(money)?;
        let penalty_paid = MinorUnits::new(row.penalty_paid)
            .checked_add(penalty)
            .map_err(money)?;
        let base_settled = base_paid.value() == row.base_amount;
        let penalty_assessed = if base_settled {
            penalty_total
        } else {
            MinorUnits::new(row.penalty_assessed)
        };

        let status = if base_settled && penalty_paid >= penalty_assessed {
            BillStatus::Paid
        } else if base_paid.is_positive() || penalty_paid.is_positive() {
            BillStatus::Partial
        } else {
            BillStatus::Unpaid
        };

        Ok(Self {
            period: row.period.clone(),
            base_paid: base_paid.value(),
            penalty_paid: penalty_paid.value(),
            penalty_assessed: penalty_assessed.max(penalty_paid).value(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Rate;
    use domain_billing::{MonthlyPenaltyPolicy, NoPenalty};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(base_amount: i64, base_paid: i64, assessed: i64, penalty_paid: i64) -> BillRow {
        BillRow {
            period: "2026-00".to_string(),
            due_date: date(2026, 5, 1),
            base_amount,
            base_paid,
            penalty_assessed: assessed,
            penalty_paid,
            description: None,
        }
    }

    #[test]
    fn test_bill_table_per_module() {
        assert_eq!(bill_table(ModuleType::Dues), "dues_bills");
        assert_eq!(bill_table(ModuleType::Utility), "utility_bills");
    }

    #[test]
    fn test_outstanding_amounts_without_policy() {
        let row = row(5000, 2000, 300, 100);
        assert_eq!(row.base_outstanding().unwrap(), MinorUnits::new(3000));
        assert_eq!(
            row.penalty_outstanding(&NoPenalty, date(2026, 7, 15)).unwrap(),
            MinorUnits::new(200)
        );
    }

    #[test]
    fn test_accrued_penalty_is_added_to_assessed() {
        let policy = MonthlyPenaltyPolicy::new(0, Rate::from_percentage(dec!(10)));
        let row = row(5000, 0, 0, 0);
        // 75 days late: three started 30-day periods at 10% simple
        let penalty = row.penalty_outstanding(&policy, date(2026, 7, 15)).unwrap();
        assert_eq!(penalty, MinorUnits::new(1500));
    }

    #[test]
    fn test_settle_full_payment_marks_paid() {
        let row = row(5000, 0, 500, 0);
        let settled = BillSettlement::settle(
            &row,
            MinorUnits::new(5000),
            MinorUnits::new(500),
            &NoPenalty,
            date(2026, 7, 15),
        )
        .unwrap();

        assert_eq!(settled.base_paid, 5000);
        assert_eq!(settled.penalty_paid, 500);
        assert_eq!(settled.status, BillStatus::Paid);
    }

    #[test]
    fn test_settle_partial_base_stays_partial() {
        let row = row(5000, 0, 0, 0);
        let settled = BillSettlement::settle(
            &row,
            MinorUnits::new(1200),
            MinorUnits::ZERO,
            &NoPenalty,
            date(2026, 7, 15),
        )
        .unwrap();

        assert_eq!(settled.base_paid, 1200);
        assert_eq!(settled.status, BillStatus::Partial);
    }

    #[test]
    fn test_settling_base_freezes_accrued_penalty() {
        let policy = MonthlyPenaltyPolicy::new(0, Rate::from_percentage(dec!(10)));
        let row = row(5000, 0, 0, 0);
        let settled = BillSettlement::settle(
            &row,
            MinorUnits::new(5000),
            MinorUnits::ZERO,
            &policy,
            date(2026, 7, 15),
        )
        .unwrap();

        assert_eq!(settled.penalty_assessed, 1500);
        assert_eq!(settled.status, BillStatus::Partial);
    }

    #[test]
    fn test_settle_rejects_overpayment_as_conflict() {
        let row = row(5000, 4000, 0, 0);
        let result = BillSettlement::settle(
            &row,
            MinorUnits::new(2000),
            MinorUnits::ZERO,
            &NoPenalty,
            date(2026, 7, 15),
        );
        assert!(matches!(result, Err(DatabaseError::Conflict(_))));
    }
}
