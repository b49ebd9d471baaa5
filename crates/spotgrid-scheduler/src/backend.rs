//! Execution backends.
//!
//! A `Backend` applies actions for one `BackendKind`. The scheduler never
//! sees backends directly: it emits backend-agnostic actions and the
//! `ActionExecutor` dispatches them.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use spotgrid_state::{Action, ActionId, ActionKind, BackendKind, DeploymentId, Placement};

use crate::error::ControlError;
use crate::executor::ObservedState;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Capability to run deployments of one backend kind.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Decide whether to accept an action. `Err` becomes a Reject reply.
    fn validate(&self, action: &Action) -> Result<(), String>;

    /// Apply an accepted action and report what is now running.
    fn apply<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, Result<ObservedState, ControlError>>;
}

// ── Simulated backend ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct SimDeployment {
    placement: Option<Placement>,
    instances: u32,
}

#[derive(Default)]
struct SimState {
    deployments: HashMap<DeploymentId, SimDeployment>,
    /// Results of applied actions, replayed on resubmission.
    applied: HashMap<ActionId, Result<ObservedState, ControlError>>,
    /// (deployment, action name) → (remaining failures, error).
    failures: HashMap<(DeploymentId, &'static str), (u32, ControlError)>,
    /// (deployment, action name) → remaining rejections.
    rejections: HashMap<(DeploymentId, &'static str), u32>,
}

/// In-memory backend that applies every action instantly.
///
/// Used by the daemon's dry-run mode and by tests, which can inject
/// failures and rejections per deployment and action kind.
pub struct SimulatedBackend {
    kind: BackendKind,
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            state: Mutex::new(SimState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `times` applications of `action` ("provision", "resize", ...)
    /// for a deployment fail with `error`.
    pub fn fail_next(&self, deployment_id: &str, action: &'static str, times: u32, error: ControlError) {
        self.lock()
            .failures
            .insert((deployment_id.to_string(), action), (times, error));
    }

    /// Make the next `times` submissions of `action` for a deployment be rejected.
    pub fn reject_next(&self, deployment_id: &str, action: &'static str, times: u32) {
        self.lock()
            .rejections
            .insert((deployment_id.to_string(), action), times);
    }

    /// Instances currently running for a deployment.
    pub fn instances(&self, deployment_id: &str) -> u32 {
        self.lock()
            .deployments
            .get(deployment_id)
            .map_or(0, |d| d.instances)
    }

    /// Where a deployment currently runs, if anywhere.
    pub fn placement(&self, deployment_id: &str) -> Option<Placement> {
        self.lock()
            .deployments
            .get(deployment_id)
            .and_then(|d| d.placement.clone())
    }

    fn apply_now(&self, action: &Action) -> Result<ObservedState, ControlError> {
        let mut state = self.lock();
        if let Some(previous) = state.applied.get(&action.id) {
            return previous.clone();
        }

        let key = (action.deployment_id.clone(), action.kind.name());
        let injected = match state.failures.get_mut(&key) {
            Some((remaining, error)) if *remaining > 0 => {
                *remaining -= 1;
                Some(error.clone())
            }
            _ => None,
        };

        let result = match injected {
            Some(error) => Err(error),
            None => {
                let entry = state
                    .deployments
                    .entry(action.deployment_id.clone())
                    .or_default();
                match &action.kind {
                    ActionKind::Provision { placement, instances } => {
                        entry.placement = Some(placement.clone());
                        entry.instances = *instances;
                    }
                    ActionKind::Resize { to, .. } => entry.instances = *to,
                    // Replicas are replaced in place at the new shape.
                    ActionKind::Reshape { .. } => {}
                    ActionKind::Suspend => entry.instances = 0,
                    ActionKind::Resume { instances } => entry.instances = *instances,
                    ActionKind::Migrate { to, instances, .. } => {
                        entry.placement = Some(to.clone());
                        entry.instances = *instances;
                    }
                    ActionKind::Terminate => {
                        entry.placement = None;
                        entry.instances = 0;
                    }
                }
                Ok(ObservedState {
                    instances: entry.instances,
                    placement: entry.placement.clone(),
                })
            }
        };

        debug!(
            deployment = %action.deployment_id,
            action = action.kind.name(),
            ok = result.is_ok(),
            "simulated apply"
        );
        state.applied.insert(action.id, result.clone());
        result
    }
}

impl Backend for SimulatedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn validate(&self, action: &Action) -> Result<(), String> {
        match &action.kind {
            ActionKind::Provision { instances: 0, .. } => {
                return Err("provision needs at least one instance".to_string());
            }
            ActionKind::Resize { from, to } if from == to => {
                return Err(format!("resize to the current size {to}"));
            }
            ActionKind::Reshape { from, to } if from == to => {
                return Err("reshape to the current resources".to_string());
            }
            _ => {}
        }

        let mut state = self.lock();
        let key = (action.deployment_id.clone(), action.kind.name());
        if let Some(remaining) = state.rejections.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(format!("{} rejected by backend", action.kind.name()));
        }
        Ok(())
    }

    fn apply<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, Result<ObservedState, ControlError>> {
        Box::pin(async move { self.apply_now(action) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgrid_state::{OfferingKey, ResourceRequirements};

    fn action(id: u64, kind: ActionKind) -> Action {
        Action {
            id,
            deployment_id: "d1".to_string(),
            backend_kind: BackendKind::Serverless,
            kind,
            version: 1,
            issued_at: 0,
        }
    }

    fn placement(provider: &str) -> Placement {
        OfferingKey::new(provider, "r1", "c1").placement(false)
    }

    #[tokio::test]
    async fn applies_lifecycle_actions() {
        let backend = SimulatedBackend::new(BackendKind::Serverless);

        backend
            .apply(&action(1, ActionKind::Provision { placement: placement("aws"), instances: 2 }))
            .await
            .unwrap();
        assert_eq!(backend.instances("d1"), 2);

        backend.apply(&action(2, ActionKind::Suspend)).await.unwrap();
        assert_eq!(backend.instances("d1"), 0);
        assert_eq!(backend.placement("d1"), Some(placement("aws")));

        let observed = backend
            .apply(&action(
                3,
                ActionKind::Migrate {
                    from: placement("aws"),
                    to: placement("gcp"),
                    instances: 1,
                },
            ))
            .await
            .unwrap();
        assert_eq!(observed.placement, Some(placement("gcp")));

        backend.apply(&action(4, ActionKind::Terminate)).await.unwrap();
        assert_eq!(backend.placement("d1"), None);
    }

    #[tokio::test]
    async fn reshape_keeps_instances_and_placement() {
        let backend = SimulatedBackend::new(BackendKind::Serverless);
        backend
            .apply(&action(1, ActionKind::Provision { placement: placement("aws"), instances: 3 }))
            .await
            .unwrap();

        let shape = ResourceRequirements {
            cpu_shares: 1000,
            memory_bytes: 2 << 30,
            accelerator: None,
            timeout_secs: 30,
        };
        let smaller = ResourceRequirements {
            cpu_shares: 750,
            ..shape.clone()
        };
        let reshape = action(2, ActionKind::Reshape { from: shape.clone(), to: smaller });
        assert!(backend.validate(&reshape).is_ok());
        let observed = backend.apply(&reshape).await.unwrap();
        assert_eq!(observed.instances, 3);
        assert_eq!(observed.placement, Some(placement("aws")));

        let noop = action(3, ActionKind::Reshape { from: shape.clone(), to: shape });
        assert!(backend.validate(&noop).is_err());
    }

    #[tokio::test]
    async fn resubmission_replays_result() {
        let backend = SimulatedBackend::new(BackendKind::Serverless);
        let resize = action(5, ActionKind::Resize { from: 1, to: 4 });
        backend.apply(&resize).await.unwrap();
        backend.apply(&action(6, ActionKind::Resize { from: 4, to: 2 })).await.unwrap();

        let replay = backend.apply(&resize).await.unwrap();
        assert_eq!(replay.instances, 4);
        assert_eq!(backend.instances("d1"), 2);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let backend = SimulatedBackend::new(BackendKind::Serverless);
        backend.fail_next("d1", "provision", 1, ControlError::Provision("no capacity".to_string()));

        let first = backend
            .apply(&action(1, ActionKind::Provision { placement: placement("aws"), instances: 1 }))
            .await;
        assert_eq!(first, Err(ControlError::Provision("no capacity".to_string())));

        let second = backend
            .apply(&action(2, ActionKind::Provision { placement: placement("aws"), instances: 1 }))
            .await;
        assert!(second.is_ok());
    }

    #[test]
    fn validation_rejects_degenerate_and_injected() {
        let backend = SimulatedBackend::new(BackendKind::Serverless);
        assert!(backend.validate(&action(1, ActionKind::Resize { from: 2, to: 2 })).is_err());

        backend.reject_next("d1", "suspend", 1);
        assert!(backend.validate(&action(2, ActionKind::Suspend)).is_err());
        assert!(backend.validate(&action(3, ActionKind::Suspend)).is_ok());
    }
}
