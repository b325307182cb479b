//! Calendar handling for billing
//!
//! This module provides:
//! - Timezone: the association's local timezone, used to resolve "today"
//! - FiscalYearStart: the month a client's fiscal year begins, and the
//!   fiscal-month arithmetic that priority classification relies on

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timezone wrapper for client jurisdictions
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Timezone {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s)
            .map(Timezone)
            .map_err(|_| TemporalError::InvalidTimezone(s.to_string()))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Local calendar date of the given instant
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.0).date_naive()
    }

    /// Today's local calendar date
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid fiscal year start month {0}: expected 1..=12")]
    InvalidFiscalMonth(u32),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// The calendar month (1..=12) a client's fiscal year starts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FiscalYearStart(u32);

impl FiscalYearStart {
    /// Fiscal year aligned with the calendar year
    pub const JANUARY: FiscalYearStart = FiscalYearStart(1);

    pub fn new(month: u32) -> Result<Self, TemporalError> {
        if (1..=12).contains(&month) {
            Ok(Self(month))
        } else {
            Err(TemporalError::InvalidFiscalMonth(month))
        }
    }

    pub fn month(&self) -> u32 {
        self.0
    }

    /// Zero-based position of the date's month within the fiscal year
    ///
    /// `(calendar_month - start_month) mod 12`, so the start month maps to 0.
    pub fn fiscal_month_index(&self, date: NaiveDate) -> u32 {
        (date.month() + 12 - self.0) % 12
    }

    /// True when both dates fall in the same fiscal month of the same calendar year
    ///
    /// The year comparison keeps a month from matching its counterpart twelve
    /// months later.
    pub fn same_fiscal_month(&self, a: NaiveDate, b: NaiveDate) -> bool {
        self.fiscal_month_index(a) == self.fiscal_month_index(b) && a.year() == b.year()
    }
}

impl Default for FiscalYearStart {
    fn default() -> Self {
        Self::JANUARY
    }
}

impl TryFrom<u32> for FiscalYearStart {
    type Error = TemporalError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FiscalYearStart> for u32 {
    fn from(start: FiscalYearStart) -> u32 {
        start.0
    }
}
