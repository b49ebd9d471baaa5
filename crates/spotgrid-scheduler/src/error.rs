//! Controller and scheduler error types.

use thiserror::Error;

use spotgrid_state::DeploymentState;

/// Failures the control loop recovers from, recorded in `observed.last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The executor could not bring capacity up at the requested placement.
    #[error("provision failed: {0}")]
    Provision(String),

    /// Spot capacity was reclaimed by the provider.
    #[error("preempted: {0}")]
    Preemption(String),

    /// The new placement was not confirmed before the migration deadline.
    #[error("migration timed out after {0}s")]
    MigrationTimeout(u64),

    /// A request or proposal broke the deployment's policy.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// The executor did not acknowledge a submission, or report its outcome, in time.
    #[error("executor unreachable: {0}")]
    ExecutorUnreachable(String),
}

/// Errors returned by the scheduler's public operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("deployment {id} is {state} and cannot serve traffic")]
    NotServable { id: String, state: DeploymentState },

    #[error("deployment {0} was modified concurrently, retry")]
    Conflict(String),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("state store error: {0}")]
    State(#[from] spotgrid_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
