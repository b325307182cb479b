//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::MinorUnits;

/// Tunables for the distribution engine and commit guard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on each module's bill fetch
    pub fetch_timeout_ms: u64,
    /// Largest drift a commit tolerates between the caller's `total_allocated`
    /// and the recomputed one; per-bill lines are always compared exactly
    pub commit_tolerance: MinorUnits,
    /// Funds assumed when previewing without an amount
    pub statement_funds: MinorUnits,
}

impl EngineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_commit_tolerance(mut self, tolerance: MinorUnits) -> Self {
        self.commit_tolerance = tolerance;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5_000,
            commit_tolerance: MinorUnits::new(1),
            statement_funds: MinorUnits::new(1_000_000_000_000_000),
        }
    }
}
