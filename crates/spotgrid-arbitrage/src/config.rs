//! Arbitrage tuning.

use serde::{Deserialize, Serialize};
use spotgrid_state::duration::serde_secs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    /// Fractional saving a candidate must exceed (0.15 = 15% cheaper).
    pub margin: f64,
    /// Consecutive evaluations the same candidate must win before migrating.
    pub debounce_ticks: u32,
    /// Time allowed for the new placement to be confirmed.
    #[serde(rename = "migration_deadline", with = "serde_secs")]
    pub migration_deadline_secs: u64,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            margin: 0.15,
            debounce_ticks: 2,
            migration_deadline_secs: 600,
        }
    }
}
