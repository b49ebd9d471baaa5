//! Right-sizing — shrink the per-replica resource shape of deployments that
//! keep using a small share of what they request.
//!
//! Runs after instance sizing: a deployment is only reshaped on ticks where
//! the autoscaler leaves its instance count alone. Like scale-down, a shrink
//! needs the low usage to persist for a dwell period.

use std::collections::HashMap;

use tracing::debug;

use spotgrid_state::{Deployment, DeploymentId, DeploymentState, MetricsWindow, ResourceRequirements};

use crate::config::RightSizeConfig;

/// Tracks how long each deployment has been over-provisioned.
pub struct RightSizer {
    config: RightSizeConfig,
    /// When each deployment's window first showed low usage.
    low_since: HashMap<DeploymentId, u64>,
}

impl RightSizer {
    pub fn new(config: RightSizeConfig) -> Self {
        Self {
            config,
            low_since: HashMap::new(),
        }
    }

    pub fn forget(&mut self, deployment_id: &str) {
        self.low_since.remove(deployment_id);
    }

    /// Propose a smaller resource shape, or `None`.
    ///
    /// CPU and memory are judged separately: a dimension shrinks when every
    /// sample of the window stays below the threshold for it.
    pub fn evaluate(&mut self, deployment: &Deployment, window: &MetricsWindow, now: u64) -> Option<ResourceRequirements> {
        if !self.config.enabled || deployment.state != DeploymentState::Active {
            self.forget(&deployment.id);
            return None;
        }
        if window.samples.is_empty() {
            return None;
        }

        let threshold = self.config.threshold;
        let cpu_low = window.samples.iter().all(|s| s.cpu_util < threshold);
        let mem_low = window.samples.iter().all(|s| s.mem_util < threshold);
        if !cpu_low && !mem_low {
            self.forget(&deployment.id);
            return None;
        }

        let proposed = self.shrink(&deployment.resources, cpu_low, mem_low);
        if proposed == deployment.resources {
            // Already at the floor.
            return None;
        }

        let since = *self.low_since.entry(deployment.id.clone()).or_insert(now);
        let dwelled = now.saturating_sub(since);
        if dwelled < self.config.dwell_secs {
            return None;
        }

        self.forget(&deployment.id);
        debug!(
            deployment = %deployment.id,
            cpu_from = deployment.resources.cpu_shares,
            cpu_to = proposed.cpu_shares,
            memory_from = deployment.resources.memory_bytes,
            memory_to = proposed.memory_bytes,
            dwelled,
            "over-provisioned, proposing smaller shape"
        );
        Some(proposed)
    }

    fn shrink(&self, current: &ResourceRequirements, cpu: bool, memory: bool) -> ResourceRequirements {
        let factor = self.config.shrink_factor;
        let mut next = current.clone();
        if cpu {
            let scaled = (f64::from(current.cpu_shares) * factor) as u32;
            next.cpu_shares = scaled.max(self.config.min_cpu_shares).min(current.cpu_shares);
        }
        if memory {
            let scaled = (current.memory_bytes as f64 * factor) as u64;
            next.memory_bytes = scaled.max(self.config.min_memory_bytes).min(current.memory_bytes);
        }
        next
    }
}
