//! Payment distribution errors

use thiserror::Error;

use core_kernel::{CoreError, MinorUnits, MoneyError, PortError};
use crate::bill::ModuleType;

/// Errors that can occur while previewing or committing a payment distribution
#[derive(Debug, Error)]
pub enum DistributionError {
    /// Bad unit, amount, date or payload; the caller must correct the input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown client or unit
    #[error("Not found: {0}")]
    NotFound(String),

    /// The bills changed between preview and commit; re-preview and retry
    #[error("Preview is stale: expected {expected} allocated, found {actual} ({reason})")]
    PreviewStale {
        expected: MinorUnits,
        actual: MinorUnits,
        reason: String,
    },

    /// One module's bill source failed; logged and degraded, never fatal
    #[error("Bill source for {module} failed: {reason}")]
    PartialSourceFailure {
        module: ModuleType,
        reason: String,
    },

    /// The credit ledger moved since the allocation was computed
    #[error("Credit balance changed: expected {expected}, found {actual}")]
    CreditBalanceMismatch {
        expected: MinorUnits,
        actual: MinorUnits,
    },

    /// Engine-internal bug; aborts the operation before anything is persisted
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Port error: {0}")]
    Port(PortError),
}

impl DistributionError {
    pub fn validation(message: impl Into<String>) -> Self {
        DistributionError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        DistributionError::NotFound(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        DistributionError::InvariantViolation(message.into())
    }

    /// True for conflicts the caller resolves by re-previewing
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DistributionError::PreviewStale { .. } | DistributionError::CreditBalanceMismatch { .. }
        )
    }

    /// True when retrying (after a re-preview for conflicts) may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DistributionError::Port(e) => e.is_transient(),
            other => other.is_conflict(),
        }
    }
}

impl From<PortError> for DistributionError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => {
                DistributionError::NotFound(format!("{} {}", entity_type, id))
            }
            PortError::Validation { message, .. } => DistributionError::Validation(message),
            other => DistributionError::Port(other),
        }
    }
}

impl From<CoreError> for DistributionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Money(e) => DistributionError::Money(e),
            CoreError::NotFound(msg) => DistributionError::NotFound(msg),
            CoreError::Validation(msg) => DistributionError::Validation(msg),
            CoreError::Temporal(e) => DistributionError::Validation(e.to_string()),
        }
    }
}
