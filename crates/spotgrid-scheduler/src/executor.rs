//! Action executor link — the message-passing boundary between the
//! scheduler and whatever applies actions to real capacity.
//!
//! ```text
//! Scheduler ──Submission{action, reply}──▶ ActionExecutor
//!     ▲            (bounded mpsc)              │ dispatch by backend_kind
//!     │                                        ▼
//!     │◀── SubmitReply (oneshot, ack_timeout) ─ Backend::validate
//!     │                                        │
//!     └──── ExecutorEvent (unbounded mpsc) ◀── Backend::apply
//! ```
//!
//! The scheduler drains events at the start of every tick. Events carry the
//! action id and version they act on; stale ones are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use spotgrid_state::{Action, ActionId, BackendKind, DeploymentId, Placement};

use crate::backend::Backend;
use crate::error::ControlError;

// ── Protocol ───────────────────────────────────────────────────────

/// An action handed to the executor, with the channel for its verdict.
#[derive(Debug)]
pub struct Submission {
    pub action: Action,
    pub reply: oneshot::Sender<SubmitReply>,
}

/// The executor's immediate verdict on a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
    /// Accepted; the outcome follows as an `ExecutorEvent::Observed`.
    Ack { version: u64 },
    Reject { reason: String },
}

/// What the executor observed after applying an action.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState {
    pub instances: u32,
    pub placement: Option<Placement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Succeeded(ObservedState),
    Failed(ControlError),
}

/// Asynchronous reports from the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    Observed {
        deployment_id: DeploymentId,
        action_id: ActionId,
        version: u64,
        outcome: ActionOutcome,
    },
    /// The provider reclaimed spot capacity.
    Preempted {
        deployment_id: DeploymentId,
        lost_instances: u32,
    },
    /// Requests were served (or queued) for the deployment at `at`.
    Traffic { deployment_id: DeploymentId, at: u64 },
}

// ── Channels ───────────────────────────────────────────────────────

/// Scheduler side of the executor link.
pub struct ExecutorLink {
    pub(crate) submissions: mpsc::Sender<Submission>,
    pub(crate) events: mpsc::UnboundedReceiver<ExecutorEvent>,
}

/// Executor side of the link.
pub struct ExecutorEndpoint {
    pub submissions: mpsc::Receiver<Submission>,
    pub events: mpsc::UnboundedSender<ExecutorEvent>,
}

/// Create a connected link/endpoint pair.
pub fn executor_channel(capacity: usize) -> (ExecutorLink, ExecutorEndpoint) {
    let (submit_tx, submit_rx) = mpsc::channel(capacity.max(1));
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        ExecutorLink {
            submissions: submit_tx,
            events: event_rx,
        },
        ExecutorEndpoint {
            submissions: submit_rx,
            events: event_tx,
        },
    )
}

// ── Dispatcher ─────────────────────────────────────────────────────

/// Applies submitted actions through the backend registered for their
/// `backend_kind`.
pub struct ActionExecutor {
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register the backend serving one kind of deployment.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    /// Validate, apply and report one submission.
    ///
    /// The outcome event is queued before the Ack is sent, so a scheduler
    /// that saw the Ack will find the outcome on its next drain.
    pub async fn handle(&self, submission: Submission, events: &mpsc::UnboundedSender<ExecutorEvent>) {
        let Submission { action, reply } = submission;
        let Some(backend) = self.backends.get(&action.backend_kind) else {
            warn!(
                deployment = %action.deployment_id,
                backend = ?action.backend_kind,
                "no backend registered"
            );
            let _ = reply.send(SubmitReply::Reject {
                reason: format!("no backend for {:?}", action.backend_kind),
            });
            return;
        };

        if let Err(reason) = backend.validate(&action) {
            debug!(deployment = %action.deployment_id, action = action.kind.name(), %reason, "rejected");
            let _ = reply.send(SubmitReply::Reject { reason });
            return;
        }

        let outcome = match backend.apply(&action).await {
            Ok(observed) => ActionOutcome::Succeeded(observed),
            Err(e) => ActionOutcome::Failed(e),
        };
        let _ = events.send(ExecutorEvent::Observed {
            deployment_id: action.deployment_id.clone(),
            action_id: action.id,
            version: action.version,
            outcome,
        });
        let _ = reply.send(SubmitReply::Ack {
            version: action.version,
        });
    }

    /// Serve submissions until shutdown or until the scheduler drops its link.
    pub async fn run(self, mut endpoint: ExecutorEndpoint, mut shutdown: watch::Receiver<bool>) {
        info!(backends = self.backends.len(), "action executor started");
        loop {
            tokio::select! {
                submission = endpoint.submissions.recv() => {
                    match submission {
                        Some(submission) => self.handle(submission, &endpoint.events).await,
                        None => {
                            info!("scheduler link closed, executor stopping");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("action executor shutting down");
                    break;
                }
            }
        }
    }
}
