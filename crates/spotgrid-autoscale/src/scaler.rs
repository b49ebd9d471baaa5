//! Autoscaler — utilization-driven instance sizing.
//!
//! Evaluates one Active deployment against its metrics window and returns a
//! scaling decision. Scale-down hysteresis is tracked per deployment, so the
//! same `Autoscaler` must be used across ticks.

use std::collections::HashMap;

use tracing::debug;

use spotgrid_state::{Deployment, DeploymentId, DeploymentState, MetricsSample, MetricsWindow};

use crate::config::AutoscaleConfig;

/// Slack subtracted before rounding up, so that exact multiples of the target
/// do not round to an extra instance through float error.
const CEIL_EPSILON: f64 = 1e-9;

/// A scaling decision for a single deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Scale to the specified instance count.
    ScaleTo(u32),
    /// No change needed.
    NoChange,
}

/// The autoscaler evaluates metrics and decides whether to scale
/// deployments up or down.
pub struct Autoscaler {
    config: AutoscaleConfig,
    /// When each deployment's utilization first dropped below target.
    below_target_since: HashMap<DeploymentId, u64>,
}

impl Autoscaler {
    pub fn new(config: AutoscaleConfig) -> Self {
        Self {
            config,
            below_target_since: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AutoscaleConfig {
        &self.config
    }

    /// Drop hysteresis state for a deployment.
    pub fn forget(&mut self, deployment_id: &str) {
        self.below_target_since.remove(deployment_id);
    }

    /// Evaluate a single deployment and return a scaling decision.
    pub fn evaluate(
        &mut self,
        deployment: &Deployment,
        window: &MetricsWindow,
        now: u64,
    ) -> ScaleDecision {
        if deployment.state != DeploymentState::Active {
            self.forget(&deployment.id);
            return ScaleDecision::NoChange;
        }

        let policy = &deployment.scaling;
        let current = deployment.observed.current_instances;

        // Out-of-bounds counts are corrected immediately, with or without metrics.
        let bounded = policy.clamp(current);
        if bounded != current {
            self.forget(&deployment.id);
            debug!(deployment = %deployment.id, from = current, to = bounded, "restoring instance bounds");
            return ScaleDecision::ScaleTo(bounded);
        }

        let Some(latest) = window.latest() else {
            return ScaleDecision::NoChange;
        };

        let target = policy.target_utilization;
        let utilization = latest.utilization();
        let mut desired = instances_for(current, utilization, target);

        if let Some(next) = predicted_utilization(window.tail(self.config.trend_samples)) {
            let predicted = instances_for(current, next, target);
            if predicted > desired {
                debug!(
                    deployment = %deployment.id,
                    utilization,
                    predicted_utilization = next,
                    reactive = desired,
                    predicted,
                    "rising trend"
                );
                desired = predicted;
            }
        }

        if current == 0 && latest.request_rate > 0.0 {
            desired = desired.max(1);
        }

        let desired = policy.clamp(desired);

        if desired > current {
            self.forget(&deployment.id);
            debug!(
                deployment = %deployment.id,
                from = current,
                to = desired,
                utilization,
                target,
                "scaling up"
            );
            return ScaleDecision::ScaleTo(desired);
        }

        if desired < current && utilization < target {
            let since = *self
                .below_target_since
                .entry(deployment.id.clone())
                .or_insert(now);
            let dwelled = now.saturating_sub(since);
            if dwelled >= self.config.scale_down_dwell_secs {
                self.forget(&deployment.id);
                debug!(
                    deployment = %deployment.id,
                    from = current,
                    to = desired,
                    utilization,
                    target,
                    dwelled,
                    "scaling down"
                );
                return ScaleDecision::ScaleTo(desired);
            }
            return ScaleDecision::NoChange;
        }

        self.forget(&deployment.id);
        ScaleDecision::NoChange
    }
}

/// Instances needed to bring `utilization` at `current` instances down to `target`.
fn instances_for(current: u32, utilization: f64, target: f64) -> u32 {
    let needed = (f64::from(current) * utilization / target - CEIL_EPSILON).ceil();
    if needed <= 0.0 {
        0
    } else if needed >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        needed as u32
    }
}

/// One-step linear extrapolation of a strictly increasing utilization series.
///
/// `None` unless there are at least two samples and every sample is higher
/// than the one before.
fn predicted_utilization(samples: &[MetricsSample]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let rising = samples
        .windows(2)
        .all(|pair| pair[1].utilization() > pair[0].utilization());
    if !rising {
        return None;
    }
    let first = samples[0].utilization();
    let last = samples[samples.len() - 1].utilization();
    Some(last + (last - first) / (samples.len() - 1) as f64)
}
