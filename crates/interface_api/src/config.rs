//! API configuration

use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use core_kernel::{Currency, MinorUnits, Rate, Timezone};
use domain_billing::{EngineConfig, MonthlyPenaltyPolicy, NoPenalty, PenaltyCalculator};
use infra_db::DatabaseConfig;
use std::sync::Arc;
use std::time::Duration;

/// API configuration
///
/// Loaded from `API_*` environment variables; anything unset keeps its
/// default.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    #[validate(range(min = 1))]
    pub port: u16,
    /// JWT secret for authentication
    #[validate(length(min = 16))]
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    /// Upper bound on pooled database connections
    #[validate(range(min = 1))]
    pub db_max_connections: u32,
    /// Connections kept open while idle
    pub db_min_connections: u32,
    /// Wait for a free pooled connection, in milliseconds
    #[validate(range(min = 1))]
    pub db_acquire_timeout_ms: u64,
    /// Wait on a row lock held by a concurrent commit, in milliseconds
    #[validate(range(min = 1))]
    pub db_lock_timeout_ms: u64,
    /// Log level
    pub log_level: String,
    /// Currency of payment amounts sent in major units
    pub currency: Currency,
    /// Client timezone used when a request has no as-of date
    pub timezone: Timezone,
    /// Upper bound on each module's bill fetch
    #[validate(range(min = 1))]
    pub fetch_timeout_ms: u64,
    /// Largest allocation drift a commit tolerates, in minor units
    #[validate(range(min = 0))]
    pub commit_tolerance: i64,
    /// Days after the due date before penalties accrue
    pub penalty_grace_days: u32,
    /// Monthly penalty on overdue dues, in percent; zero disables accrual
    pub dues_penalty_percent: Decimal,
    /// Monthly penalty on overdue water bills, in percent; zero disables accrual
    pub utility_penalty_percent: Decimal,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/payments".to_string(),
            db_max_connections: 10,
            db_min_connections: 1,
            db_acquire_timeout_ms: 5_000,
            db_lock_timeout_ms: 5_000,
            log_level: "info".to_string(),
            currency: Currency::MXN,
            timezone: Timezone::default(),
            fetch_timeout_ms: 5_000,
            commit_tolerance: 1,
            penalty_grace_days: 10,
            dues_penalty_percent: Decimal::ZERO,
            utility_penalty_percent: Decimal::ZERO,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config: ApiConfig = config::Config::builder()
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()?;

        config
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pool settings for the payments database
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.db_max_connections)
            .min_connections(self.db_min_connections.min(self.db_max_connections))
            .acquire_timeout(Duration::from_millis(self.db_acquire_timeout_ms))
            .lock_timeout(Duration::from_millis(self.db_lock_timeout_ms))
    }

    /// Engine tunables derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_fetch_timeout(Duration::from_millis(self.fetch_timeout_ms))
            .with_commit_tolerance(MinorUnits::new(self.commit_tolerance))
    }

    /// Penalty accrual for dues bills
    pub fn dues_penalty(&self) -> Arc<dyn PenaltyCalculator> {
        self.penalty(self.dues_penalty_percent)
    }

    /// Penalty accrual for water bills
    pub fn utility_penalty(&self) -> Arc<dyn PenaltyCalculator> {
        self.penalty(self.utility_penalty_percent)
    }

    fn penalty(&self, percent: Decimal) -> Arc<dyn PenaltyCalculator> {
        if percent.is_zero() {
            Arc::new(NoPenalty)
        } else {
            Arc::new(MonthlyPenaltyPolicy::new(
                self.penalty_grace_days,
                Rate::from_percentage(percent),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.currency, Currency::MXN);
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let config = ApiConfig {
            jwt_secret: "short".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_carries_tunables() {
        let config = ApiConfig {
            fetch_timeout_ms: 250,
            commit_tolerance: 5,
            ..ApiConfig::default()
        };
        let engine = config.engine_config();
        assert_eq!(engine.fetch_timeout_ms, 250);
        assert_eq!(engine.commit_tolerance, MinorUnits::new(5));
    }

    #[test]
    fn test_database_config_carries_pool_settings() {
        let config = ApiConfig {
            database_url: "postgres://ledger@db/payments".to_string(),
            db_max_connections: 4,
            db_min_connections: 8,
            db_acquire_timeout_ms: 300,
            db_lock_timeout_ms: 1_200,
            ..ApiConfig::default()
        };
        let database = config.database_config();
        assert_eq!(database.url, "postgres://ledger@db/payments");
        assert_eq!(database.max_connections, 4);
        assert_eq!(database.min_connections, 4);
        assert_eq!(database.acquire_timeout, Duration::from_millis(300));
        assert_eq!(database.lock_timeout, Duration::from_millis(1_200));
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let config = ApiConfig {
            db_max_connections: 0,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_penalty_policy_selection() {
        let config = ApiConfig {
            penalty_grace_days: 0,
            utility_penalty_percent: dec!(10),
            ..ApiConfig::default()
        };
        let due = chrono::NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let as_of = chrono::NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();

        let dues = config.dues_penalty().penalty_as_of(MinorUnits::new(1000), due, as_of);
        let utility = config.utility_penalty().penalty_as_of(MinorUnits::new(1000), due, as_of);
        assert_eq!(dues.unwrap(), MinorUnits::ZERO);
        assert_eq!(utility.unwrap(), MinorUnits::new(100));
    }
}
