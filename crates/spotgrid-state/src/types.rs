//! Domain types for the SpotGrid deployment store.
//!
//! These types represent the persisted state of model-serving deployments:
//! their placement, resource shape, scaling and cost policies, the state
//! observed from the executor, and the single action in flight for them.
//! All types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::lifecycle::DeploymentState;

/// Unique identifier for a deployment.
pub type DeploymentId = String;

// ── Deployment ─────────────────────────────────────────────────────

/// One logical, independently schedulable model-serving endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub id: DeploymentId,
    /// Identifier of the model artifact to serve (owned by the model repository).
    pub model_ref: String,
    pub backend_kind: BackendKind,
    /// Provider used for the first placement when multi-cloud is disabled.
    pub preferred_provider: Option<String>,
    /// Where the deployment currently runs. Unset while Creating and once Deleted.
    pub placement: Option<Placement>,
    pub resources: ResourceRequirements,
    pub scaling: ScalingPolicy,
    pub cost: CostPolicy,
    pub state: DeploymentState,
    pub observed: Observed,
    /// The single outstanding action for this deployment, if any.
    pub in_flight: Option<InFlight>,
    /// Migration in progress (set while `state = Migrating`).
    pub migration: Option<MigrationRecord>,
    /// Consecutive failed attempts of the current provision/resize transition.
    pub retries: u32,
    /// Unix timestamp (seconds) when this deployment was proposed.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last state change.
    pub updated_at: u64,
}

/// Request accepted by `propose_deployment`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRequest {
    pub id: DeploymentId,
    pub model_ref: String,
    pub backend_kind: BackendKind,
    #[serde(default)]
    pub preferred_provider: Option<String>,
    pub resources: ResourceRequirements,
    pub scaling: ScalingPolicy,
    pub cost: CostPolicy,
}

/// Execution backend a deployment is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Serverless,
    OrchestratedCluster,
}

/// Concrete location of a deployment's serving capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub provider: String,
    pub region: String,
    pub instance_class: String,
    /// Whether the capacity is spot/preemptible.
    pub spot: bool,
}

/// Accelerator attached to each replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accelerator {
    pub kind: String,
    pub count: u32,
}

/// Resources required by a single replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU in millicores.
    pub cpu_shares: u32,
    /// Memory in bytes.
    pub memory_bytes: u64,
    pub accelerator: Option<Accelerator>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Instance bounds and utilization target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    pub min_instances: u32,
    pub max_instances: u32,
    /// Target utilization in (0, 1].
    pub target_utilization: f64,
}

/// Cost optimization switches for a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostPolicy {
    pub allow_spot: bool,
    pub hibernation_enabled: bool,
    /// Seconds without traffic before a deployment is eligible for hibernation.
    pub idle_timeout_secs: u64,
    pub allow_multi_cloud: bool,
}

/// State reported by the action executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    pub current_instances: u32,
    pub last_request_at: Option<u64>,
    pub last_reconciled_at: Option<u64>,
    pub last_error: Option<String>,
    /// Set by `request_resume` until the deployment is resumed.
    #[serde(default)]
    pub wake_requested: bool,
    /// Instance count to restore after spot capacity was reclaimed.
    #[serde(default)]
    pub recovery_target: Option<u32>,
    /// Scheduled activation: resume a hibernated deployment at this time.
    #[serde(default)]
    pub wake_at: Option<u64>,
}

/// Bookkeeping for the single outstanding action of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InFlight {
    pub action: Action,
    /// Submission attempts so far.
    pub attempts: u32,
    /// Whether the executor acknowledged the submission.
    pub acked: bool,
    /// When the acknowledgement arrived. The outcome is due within the
    /// configured outcome timeout of this.
    #[serde(default)]
    pub acked_at: Option<u64>,
    /// Unix timestamp of the most recent submission attempt.
    pub submitted_at: u64,
    /// Earliest time an unacknowledged action may be resubmitted.
    pub next_attempt_at: u64,
}

/// An in-progress migration between two placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub from: Placement,
    pub to: Placement,
    /// State restored if the migration is rolled back.
    pub prior_state: DeploymentState,
    pub started_at: u64,
    /// The new placement must be confirmed before this time.
    pub deadline_at: u64,
}

/// Filter for `list_deployments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFilter {
    pub state: Option<DeploymentState>,
    pub provider: Option<String>,
    pub backend_kind: Option<BackendKind>,
}

impl DeploymentFilter {
    pub fn matches(&self, deployment: &Deployment) -> bool {
        if let Some(state) = self.state
            && deployment.state != state
        {
            return false;
        }
        if let Some(provider) = &self.provider {
            match &deployment.placement {
                Some(p) if &p.provider == provider => {}
                _ => return false,
            }
        }
        if let Some(kind) = self.backend_kind
            && deployment.backend_kind != kind
        {
            return false;
        }
        true
    }
}

impl ScalingPolicy {
    /// Clamp an instance count into `[min_instances, max_instances]`.
    pub fn clamp(&self, instances: u32) -> u32 {
        instances.clamp(self.min_instances, self.max_instances)
    }

    /// Check the policy's own constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_instances == 0 {
            return Err("max_instances must be at least 1".to_string());
        }
        if self.max_instances < self.min_instances {
            return Err(format!(
                "max_instances ({}) is below min_instances ({})",
                self.max_instances, self.min_instances
            ));
        }
        if !(self.target_utilization > 0.0 && self.target_utilization <= 1.0) {
            return Err(format!(
                "target_utilization {} is outside (0, 1]",
                self.target_utilization
            ));
        }
        Ok(())
    }
}

impl ResourceRequirements {
    pub fn validate(&self) -> Result<(), String> {
        if self.cpu_shares == 0 {
            return Err("cpu_shares must be positive".to_string());
        }
        if self.memory_bytes == 0 {
            return Err("memory_bytes must be positive".to_string());
        }
        if let Some(acc) = &self.accelerator
            && acc.count == 0
        {
            return Err("accelerator count must be positive".to_string());
        }
        Ok(())
    }
}

impl DeploymentRequest {
    /// Validate the request's policies and resource shape.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("deployment id must not be empty".to_string());
        }
        self.scaling.validate()?;
        self.resources.validate()
    }

    /// Build the initial `Creating` record for this request.
    pub fn into_deployment(self, now: u64) -> Deployment {
        Deployment {
            id: self.id,
            model_ref: self.model_ref,
            backend_kind: self.backend_kind,
            preferred_provider: self.preferred_provider,
            placement: None,
            resources: self.resources,
            scaling: self.scaling,
            cost: self.cost,
            state: DeploymentState::Creating,
            observed: Observed::default(),
            in_flight: None,
            migration: None,
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Deployment {
    /// Newest moment the deployment is known to have served (or been created).
    pub fn last_activity(&self) -> u64 {
        self.observed
            .last_request_at
            .unwrap_or(self.created_at)
            .max(self.created_at)
    }

    /// Check the data-model invariants for the current state.
    pub fn check_invariants(&self) -> Result<(), String> {
        let instances = self.observed.current_instances;
        match self.state {
            DeploymentState::Active => {
                if instances < self.scaling.min_instances || instances > self.scaling.max_instances {
                    return Err(format!(
                        "{}: {} instances outside [{}, {}] while active",
                        self.id, instances, self.scaling.min_instances, self.scaling.max_instances
                    ));
                }
            }
            DeploymentState::Hibernated | DeploymentState::Deleted => {
                if instances != 0 {
                    return Err(format!(
                        "{}: {} instances while {:?}",
                        self.id, instances, self.state
                    ));
                }
            }
            _ => {}
        }
        let wants_placement = self.state.requires_placement();
        // A deployment deleted before its first placement has none to release.
        let unplaced_delete = self.state == DeploymentState::Deleting && self.placement.is_none();
        if wants_placement != self.placement.is_some() && !unplaced_delete {
            return Err(format!(
                "{}: placement {} while {:?}",
                self.id,
                if self.placement.is_some() { "set" } else { "unset" },
                self.state
            ));
        }
        Ok(())
    }
}
