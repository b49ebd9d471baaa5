//! Deployment lifecycle state machine.
//!
//! ```text
//! Creating ──▶ Active ◀──▶ Scaling
//!    │          │  ▲  ╲
//!    │          │  │   ╲──▶ Migrating ──▶ Active | Failed | (rollback) prior state
//!    │          ▼  │
//!    │     Hibernating ──▶ Hibernated ──▶ Active | Migrating
//!    ▼
//!  Failed            any non-terminal ──▶ Deleting ──▶ Deleted
//! ```
//!
//! Only the scheduler applies transitions; every other component proposes.

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::types::Deployment;

/// Lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Creating,
    Active,
    Scaling,
    Hibernating,
    Hibernated,
    Migrating,
    Failed,
    Deleting,
    Deleted,
}

impl DeploymentState {
    pub const ALL: [DeploymentState; 9] = [
        DeploymentState::Creating,
        DeploymentState::Active,
        DeploymentState::Scaling,
        DeploymentState::Hibernating,
        DeploymentState::Hibernated,
        DeploymentState::Migrating,
        DeploymentState::Failed,
        DeploymentState::Deleting,
        DeploymentState::Deleted,
    ];

    /// Terminal states are never left by the controller on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentState::Deleted | DeploymentState::Failed)
    }

    /// Whether `placement` must be set in this state.
    pub fn requires_placement(self) -> bool {
        !matches!(self, DeploymentState::Creating | DeploymentState::Deleted)
    }

    /// Whether the transition `self → to` is part of the lifecycle.
    ///
    /// `Failed → Deleting` is allowed so that an explicit delete request can
    /// release whatever the failed deployment still holds.
    pub fn can_transition_to(self, to: DeploymentState) -> bool {
        use DeploymentState::*;
        match (self, to) {
            (Deleted, _) => false,
            (Deleting, Deleted) => true,
            (Deleting, _) => false,
            (_, Deleting) => true,
            (Creating, Active | Failed) => true,
            (Active, Scaling | Hibernating | Migrating) => true,
            (Scaling, Active | Failed) => true,
            (Hibernating, Hibernated | Active) => true,
            (Hibernated, Active | Migrating) => true,
            (Migrating, Active | Hibernated | Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentState::Creating => "creating",
            DeploymentState::Active => "active",
            DeploymentState::Scaling => "scaling",
            DeploymentState::Hibernating => "hibernating",
            DeploymentState::Hibernated => "hibernated",
            DeploymentState::Migrating => "migrating",
            DeploymentState::Failed => "failed",
            DeploymentState::Deleting => "deleting",
            DeploymentState::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Deployment {
    /// Move to `to`, rejecting transitions outside the lifecycle.
    pub fn transition(&mut self, to: DeploymentState, now: u64) -> StateResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(StateError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.updated_at = now;
        Ok(())
    }
}
