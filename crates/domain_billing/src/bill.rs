//! Bills and the identifiers that keep two billing modules apart
//!
//! Each module chooses its own period keys ("2026-00", "2026-Q3"), so a key is
//! only unique inside its module. [`NamespacedPeriod`] tags the key with its
//! module before bills from both modules are merged into one ordering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{MinorUnits, MoneyError};
use crate::error::DistributionError;

/// The billing module a charge originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    /// HOA maintenance dues
    Dues,
    /// Metered water consumption
    Utility,
}

impl ModuleType {
    pub const ALL: [ModuleType; 2] = [ModuleType::Dues, ModuleType::Utility];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Dues => "dues",
            ModuleType::Utility => "utility",
        }
    }

    /// Whether bills that are not yet due may be paid in advance
    ///
    /// Utility is postpaid: a charge is only payable once it has been billed
    /// for a past or current period.
    pub fn allows_prepayment(&self) -> bool {
        matches!(self, ModuleType::Dues)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dues" => Ok(ModuleType::Dues),
            "utility" => Ok(ModuleType::Utility),
            other => Err(DistributionError::validation(format!(
                "unknown billing module '{}'",
                other
            ))),
        }
    }
}

/// Payment status of a bill after an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Unpaid,
    Partial,
    Paid,
}

impl BillStatus {
    /// Derives the status from what was paid against what was owed
    pub fn from_amounts(paid: MinorUnits, owed: MinorUnits) -> Self {
        if paid >= owed {
            BillStatus::Paid
        } else if paid.is_positive() {
            BillStatus::Partial
        } else {
            BillStatus::Unpaid
        }
    }
}

/// One outstanding charge from one module for one billing period
///
/// Amounts are what is still owed as of the fetch date: the base charge net of
/// earlier payments, and the penalty recalculated for that date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub module: ModuleType,
    /// Module-local period key
    pub period: String,
    pub due_date: NaiveDate,
    pub base_amount_due: MinorUnits,
    pub penalty_amount_due: MinorUnits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Bill {
    /// Creates a bill with no penalty
    pub fn new(
        module: ModuleType,
        period: impl Into<String>,
        due_date: NaiveDate,
        base_amount_due: MinorUnits,
    ) -> Self {
        Self {
            module,
            period: period.into(),
            due_date,
            base_amount_due,
            penalty_amount_due: MinorUnits::ZERO,
            description: None,
        }
    }

    /// Sets the penalty owed
    pub fn with_penalty(mut self, penalty: MinorUnits) -> Self {
        self.penalty_amount_due = penalty;
        self
    }

    /// Sets a human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Base plus penalty
    pub fn total_due(&self) -> Result<MinorUnits, MoneyError> {
        self.base_amount_due.checked_add(self.penalty_amount_due)
    }

    pub fn namespaced_period(&self) -> NamespacedPeriod {
        NamespacedPeriod::new(self.module, self.period.clone())
    }

    /// Checks the shape an adapter must deliver
    pub fn validate(&self) -> Result<(), DistributionError> {
        if self.period.trim().is_empty() {
            return Err(DistributionError::validation(format!(
                "{} bill due {} has an empty period",
                self.module, self.due_date
            )));
        }
        if self.base_amount_due.is_negative() || self.penalty_amount_due.is_negative() {
            return Err(DistributionError::validation(format!(
                "{} bill {} has a negative amount (base {}, penalty {})",
                self.module, self.period, self.base_amount_due, self.penalty_amount_due
            )));
        }
        self.total_due()?;
        Ok(())
    }
}

/// A period key tagged with its module, unique across modules
///
/// Renders as `module:period`, e.g. `dues:2026-00`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespacedPeriod {
    module: ModuleType,
    period: String,
}

impl NamespacedPeriod {
    pub fn new(module: ModuleType, period: impl Into<String>) -> Self {
        Self {
            module,
            period: period.into(),
        }
    }

    pub fn module(&self) -> ModuleType {
        self.module
    }

    /// The module-local period with the namespace stripped
    pub fn local_period(&self) -> &str {
        &self.period
    }
}

impl fmt::Display for NamespacedPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.period)
    }
}

impl FromStr for NamespacedPeriod {
    type Err = DistributionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, period) = s.split_once(':').ok_or_else(|| {
            DistributionError::validation(format!("period '{}' has no module namespace", s))
        })?;
        Ok(Self::new(module.parse()?, period))
    }
}

impl TryFrom<String> for NamespacedPeriod {
    type Error = DistributionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NamespacedPeriod> for String {
    fn from(period: NamespacedPeriod) -> String {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_same_period_in_both_modules_stays_distinct() {
        let dues = Bill::new(ModuleType::Dues, "2026-00", date(2026, 7, 1), MinorUnits::new(100));
        let water = Bill::new(ModuleType::Utility, "2026-00", date(2026, 7, 1), MinorUnits::new(100));

        assert_ne!(dues.namespaced_period(), water.namespaced_period());
        assert_eq!(dues.namespaced_period().to_string(), "dues:2026-00");
        assert_eq!(water.namespaced_period().to_string(), "utility:2026-00");
    }

    #[test]
    fn test_namespaced_period_parse_strips_only_first_separator() {
        let parsed: NamespacedPeriod = "utility:2026:Q1".parse().unwrap();
        assert_eq!(parsed.module(), ModuleType::Utility);
        assert_eq!(parsed.local_period(), "2026:Q1");
    }

    #[test]
    fn test_namespaced_period_parse_rejects_missing_namespace() {
        assert!("2026-00".parse::<NamespacedPeriod>().is_err());
        assert!("gas:2026-00".parse::<NamespacedPeriod>().is_err());
    }

    #[test]
    fn test_bill_status_from_amounts() {
        let owed = MinorUnits::new(5000);
        assert_eq!(BillStatus::from_amounts(MinorUnits::ZERO, owed), BillStatus::Unpaid);
        assert_eq!(BillStatus::from_amounts(MinorUnits::new(3000), owed), BillStatus::Partial);
        assert_eq!(BillStatus::from_amounts(owed, owed), BillStatus::Paid);
    }

    #[test]
    fn test_validate_rejects_negative_penalty() {
        let bill = Bill::new(ModuleType::Dues, "2026-01", date(2026, 2, 1), MinorUnits::new(100))
            .with_penalty(MinorUnits::new(-1));
        assert!(matches!(bill.validate(), Err(DistributionError::Validation(_))));
    }

    #[test]
    fn test_only_dues_allow_prepayment() {
        assert!(ModuleType::Dues.allows_prepayment());
        assert!(!ModuleType::Utility.allows_prepayment());
    }
}
