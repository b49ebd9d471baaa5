//! Hibernation manager — idle detection and wake decisions.
//!
//! Stateless: every decision is derived from the deployment record, its
//! metrics window and the pricing snapshot of the current tick.

use tracing::{debug, info};

use spotgrid_cost::hibernation_savings;
use spotgrid_state::{Deployment, DeploymentState, MetricsWindow, PricingSnapshot, ScalingPolicy};

use crate::config::HibernationConfig;

/// Why a hibernated deployment is being woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// `request_resume` was called.
    Requested,
    /// Requests arrived after the deployment was suspended.
    Traffic,
    /// The scheduled activation time has come.
    Scheduled,
}

/// Outcome of one hibernation evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum HibernationDecision {
    Suspend {
        /// Seconds since the last activity.
        idle_secs: u64,
        /// Hourly spend avoided by suspending.
        savings_per_hour: f64,
    },
    Resume {
        instances: u32,
        reason: WakeReason,
    },
    NoChange,
}

/// Instance count a deployment resumes with: at least one, within its bounds.
pub fn resume_instances(policy: &ScalingPolicy) -> u32 {
    policy.clamp(policy.min_instances.max(1))
}

pub struct HibernationManager {
    config: HibernationConfig,
}

impl HibernationManager {
    pub fn new(config: HibernationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HibernationConfig {
        &self.config
    }

    /// Whether the deployment may ever be suspended under its current policy.
    pub fn eligible(&self, deployment: &Deployment) -> bool {
        self.config.enabled
            && deployment.cost.hibernation_enabled
            && deployment.scaling.min_instances == 0
    }

    /// Newest activity seen for the deployment: a recorded request, a window
    /// sample with traffic, or its creation.
    pub fn last_activity(deployment: &Deployment, window: &MetricsWindow) -> u64 {
        let from_window = window.last_traffic_at().unwrap_or(0);
        deployment.last_activity().max(from_window)
    }

    /// Evaluate one deployment.
    pub fn evaluate(
        &self,
        deployment: &Deployment,
        window: &MetricsWindow,
        snapshot: &PricingSnapshot,
        now: u64,
    ) -> HibernationDecision {
        match deployment.state {
            DeploymentState::Active => self.evaluate_active(deployment, window, snapshot, now),
            DeploymentState::Hibernated => Self::evaluate_hibernated(deployment, window, now),
            _ => HibernationDecision::NoChange,
        }
    }

    fn evaluate_active(
        &self,
        deployment: &Deployment,
        window: &MetricsWindow,
        snapshot: &PricingSnapshot,
        now: u64,
    ) -> HibernationDecision {
        if !self.eligible(deployment) {
            return HibernationDecision::NoChange;
        }

        let last_activity = Self::last_activity(deployment, window);
        let idle_secs = now.saturating_sub(last_activity);
        if idle_secs <= deployment.cost.idle_timeout_secs {
            return HibernationDecision::NoChange;
        }

        let savings_per_hour = hibernation_savings(deployment, snapshot);
        info!(
            deployment = %deployment.id,
            idle_secs,
            idle_timeout = deployment.cost.idle_timeout_secs,
            savings_per_hour,
            "idle, proposing suspend"
        );
        HibernationDecision::Suspend {
            idle_secs,
            savings_per_hour,
        }
    }

    fn evaluate_hibernated(deployment: &Deployment, window: &MetricsWindow, now: u64) -> HibernationDecision {
        let instances = resume_instances(&deployment.scaling);

        if deployment.observed.wake_requested {
            info!(deployment = %deployment.id, instances, "wake requested, proposing resume");
            return HibernationDecision::Resume {
                instances,
                reason: WakeReason::Requested,
            };
        }

        if let Some(wake_at) = deployment.observed.wake_at
            && wake_at <= now
        {
            info!(deployment = %deployment.id, instances, wake_at, "scheduled activation, proposing resume");
            return HibernationDecision::Resume {
                instances,
                reason: WakeReason::Scheduled,
            };
        }

        // Only traffic that arrived after suspension counts.
        let suspended_at = deployment.updated_at;
        let recorded = deployment
            .observed
            .last_request_at
            .is_some_and(|at| at > suspended_at);
        let sampled = window
            .last_traffic_at()
            .is_some_and(|at| at > suspended_at);
        if recorded || sampled {
            info!(deployment = %deployment.id, instances, "traffic while hibernated, proposing resume");
            return HibernationDecision::Resume {
                instances,
                reason: WakeReason::Traffic,
            };
        }

        debug!(deployment = %deployment.id, "still hibernated");
        HibernationDecision::NoChange
    }
}
