//! Actions emitted by the scheduler and the journal that records them.

use serde::{Deserialize, Serialize};

use crate::types::{BackendKind, DeploymentId, Placement, ResourceRequirements};

/// Monotonic action identifier, unique within one scheduler.
pub type ActionId = u64;

/// A single intent for one deployment, emitted in one tick.
///
/// Immutable once emitted. `version` is the store version of the deployment
/// record that holds this action in flight; executor events must echo it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub deployment_id: DeploymentId,
    pub backend_kind: BackendKind,
    pub kind: ActionKind,
    pub version: u64,
    pub issued_at: u64,
}

/// What the executor is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Bring up `instances` replicas at `placement`.
    Provision { placement: Placement, instances: u32 },
    Resize { from: u32, to: u32 },
    /// Change the per-replica resource shape, keeping the instance count.
    Reshape {
        from: ResourceRequirements,
        to: ResourceRequirements,
    },
    /// Release all serving capacity, keeping placement metadata.
    Suspend,
    /// Restore `instances` replicas at the retained placement.
    Resume { instances: u32 },
    /// Provision at `to`, shift traffic, then decommission `from`.
    Migrate {
        from: Placement,
        to: Placement,
        instances: u32,
    },
    Terminate,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Provision { .. } => "provision",
            ActionKind::Resize { .. } => "resize",
            ActionKind::Reshape { .. } => "reshape",
            ActionKind::Suspend => "suspend",
            ActionKind::Resume { .. } => "resume",
            ActionKind::Migrate { .. } => "migrate",
            ActionKind::Terminate => "terminate",
        }
    }
}

// ── Journal ───────────────────────────────────────────────────────

/// Audit record of an emitted action and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub action: Action,
    pub status: JournalStatus,
    /// Unix timestamp of the last status change.
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JournalStatus {
    Emitted,
    Acknowledged,
    Rejected { reason: String },
    Completed,
    Failed { reason: String },
    /// Superseded by a terminate or abandoned after a rollback.
    Cancelled { reason: String },
}

impl JournalStatus {
    /// Emitted or acknowledged: the action may still change the deployment.
    pub fn is_open(&self) -> bool {
        matches!(self, JournalStatus::Emitted | JournalStatus::Acknowledged)
    }

    /// Whether an entry in this status may be overwritten with `next`.
    /// Closed entries are final and an acknowledgement never regresses.
    pub fn admits(&self, next: &JournalStatus) -> bool {
        match self {
            JournalStatus::Emitted => true,
            JournalStatus::Acknowledged => *next != JournalStatus::Emitted,
            _ => false,
        }
    }
}

impl JournalEntry {
    /// Build the composite key for the actions table.
    pub fn table_key(&self) -> String {
        journal_key(&self.action.deployment_id, self.action.id)
    }
}

/// Key for an action journal entry. Zero-padded so keys sort by action id.
pub fn journal_key(deployment_id: &str, action_id: ActionId) -> String {
    format!("{deployment_id}:{action_id:020}")
}
