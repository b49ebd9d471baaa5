//! Autoscaler tuning.

use serde::{Deserialize, Serialize};
use spotgrid_state::duration::serde_secs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    /// How long utilization must stay below target before scaling down.
    #[serde(rename = "scale_down_dwell", with = "serde_secs")]
    pub scale_down_dwell_secs: u64,
    /// Samples inspected for a rising trend. Values below 2 disable prediction.
    pub trend_samples: usize,
    /// Age of the oldest sample the autoscaler looks at.
    #[serde(rename = "window", with = "serde_secs")]
    pub window_secs: u64,
    pub right_size: RightSizeConfig,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            scale_down_dwell_secs: 300,
            trend_samples: 3,
            window_secs: 600,
            right_size: RightSizeConfig::default(),
        }
    }
}

/// Per-replica resource shrinking for over-provisioned deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RightSizeConfig {
    pub enabled: bool,
    /// Usage fraction below which a resource counts as over-provisioned.
    pub threshold: f64,
    /// Multiplier applied to an over-provisioned resource.
    pub shrink_factor: f64,
    /// How long usage must stay low before shrinking.
    #[serde(rename = "dwell", with = "serde_secs")]
    pub dwell_secs: u64,
    pub min_cpu_shares: u32,
    pub min_memory_bytes: u64,
}

impl Default for RightSizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.30,
            shrink_factor: 0.75,
            dwell_secs: 3600,
            min_cpu_shares: 250,
            min_memory_bytes: 512 << 20,
        }
    }
}
