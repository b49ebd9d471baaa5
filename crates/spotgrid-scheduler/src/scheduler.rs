//! Scheduler — the reconciliation loop.
//!
//! Each tick:
//! 1. drain executor events (outcomes, preemptions, traffic) into the store
//! 2. for every live deployment, either follow up on its in-flight action
//!    (migration deadline, outcome timeout, resubmission with back-off) or
//!    plan and emit at most one new action
//! 3. drain events again, so actions the executor confirmed during the tick
//!    land in the same tick
//!
//! Every write is a compare-and-swap against the version that was read. A
//! lost race skips the deployment until the next tick.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use spotgrid_metrics::MetricsFeed;
use spotgrid_state::{
    Action, ActionKind, Deployment, DeploymentFilter, DeploymentRequest, DeploymentState,
    DeploymentStore, InFlight, JournalEntry, JournalStatus, StateError,
};

use crate::clock::{Clock, SystemClock};
use crate::config::ControllerConfig;
use crate::context::TickContext;
use crate::error::{ControlError, SchedulerError, SchedulerResult};
use crate::executor::{ActionOutcome, ExecutorEvent, ExecutorLink, SubmitReply, Submission};
use crate::reconcile::{self, Planner};

/// Read-modify-write attempts before an operation reports a conflict.
const CAS_ATTEMPTS: u32 = 5;

/// Answer to `request_resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeStatus {
    /// The deployment is serving.
    Ready,
    /// Capacity is on its way; ask again after the hint.
    Waking { retry_after_secs: u64 },
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub now: u64,
    /// Live deployments looked at.
    pub evaluated: usize,
    /// Actions emitted this tick, in emission order.
    pub emitted: Vec<Action>,
    pub resubmitted: usize,
    pub events_applied: usize,
    pub rolled_back: usize,
    /// Deployments moved to Failed.
    pub failed: usize,
    pub errors: usize,
}

impl TickReport {
    /// Names of the actions emitted for one deployment.
    pub fn emitted_for(&self, deployment_id: &str) -> Vec<&'static str> {
        self.emitted
            .iter()
            .filter(|a| a.deployment_id == deployment_id)
            .map(|a| a.kind.name())
            .collect()
    }
}

/// Loop-owned state, held for the duration of a tick.
struct LoopState {
    planner: Planner,
    events: mpsc::UnboundedReceiver<ExecutorEvent>,
}

/// The reconciliation loop and the public deployment operations.
///
/// Ticks are serialized internally; the public operations may run
/// concurrently with a tick and rely on compare-and-swap alone.
pub struct Scheduler {
    store: DeploymentStore,
    config: ControllerConfig,
    submissions: mpsc::Sender<Submission>,
    loop_state: Mutex<LoopState>,
    next_action_id: AtomicU64,
    /// Actions emitted since start, by kind.
    emitted: StdMutex<BTreeMap<&'static str, u64>>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Create a scheduler over a store and an executor link.
    pub fn new(store: DeploymentStore, config: ControllerConfig, link: ExecutorLink) -> SchedulerResult<Self> {
        config.validate().map_err(ControlError::PolicyViolation)?;
        let next_action_id = store.last_action_id()? + 1;
        let ExecutorLink { submissions, events } = link;
        Ok(Self {
            loop_state: Mutex::new(LoopState {
                planner: Planner::new(&config),
                events,
            }),
            store,
            config,
            submissions,
            next_action_id: AtomicU64::new(next_action_id),
            emitted: StdMutex::new(BTreeMap::new()),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used by the public operations and `tick_with_feed`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ── Public operations ──────────────────────────────────────────

    /// Accept a new deployment in state Creating.
    ///
    /// An id may be reused once its previous deployment is Deleted.
    pub fn propose_deployment(&self, request: DeploymentRequest) -> SchedulerResult<Deployment> {
        request.validate().map_err(ControlError::PolicyViolation)?;
        let deployment = request.into_deployment(self.clock.now());

        match self.store.read(&deployment.id)? {
            None => {
                self.store.insert(&deployment)?;
            }
            Some((existing, version)) if existing.state == DeploymentState::Deleted => {
                if !self.store.compare_and_swap(&deployment.id, version, &deployment)? {
                    return Err(SchedulerError::Conflict(deployment.id));
                }
            }
            Some(_) => return Err(StateError::AlreadyExists(deployment.id).into()),
        }

        info!(
            deployment = %deployment.id,
            model = %deployment.model_ref,
            backend = ?deployment.backend_kind,
            "deployment proposed"
        );
        Ok(deployment)
    }

    /// Start deleting a deployment, cancelling whatever it has in flight.
    pub fn request_delete(&self, deployment_id: &str) -> SchedulerResult<()> {
        let now = self.clock.now();
        let mut cancelled = None;

        let updated = self.update(deployment_id, |d| {
            cancelled = None;
            if matches!(d.state, DeploymentState::Deleting | DeploymentState::Deleted) {
                return Ok(false);
            }
            if let Some(flight) = d.in_flight.take() {
                if d.placement.is_none()
                    && let ActionKind::Provision { placement, .. } = &flight.action.kind
                {
                    d.placement = Some(placement.clone());
                }
                cancelled = Some(flight.action);
            }
            if let Some(migration) = d.migration.take() {
                d.placement = Some(migration.from);
            }
            d.transition(DeploymentState::Deleting, now)?;
            Ok(true)
        })?;

        match updated {
            Some(d) => info!(deployment = %deployment_id, state = %d.state, "delete requested"),
            None => debug!(deployment = %deployment_id, "already deleting"),
        }
        if let Some(action) = cancelled {
            self.journal(
                &action,
                JournalStatus::Cancelled {
                    reason: "superseded by delete".to_string(),
                },
                now,
            )?;
        }
        Ok(())
    }

    /// Ask for a deployment to be serving, waking it if it is hibernated.
    pub fn request_resume(&self, deployment_id: &str) -> SchedulerResult<WakeStatus> {
        let waking = WakeStatus::Waking {
            retry_after_secs: self.config.hibernation.wake_retry_after_secs,
        };
        let deployment = self.get_deployment(deployment_id)?;

        match deployment.state {
            DeploymentState::Active => Ok(WakeStatus::Ready),
            DeploymentState::Creating | DeploymentState::Scaling => Ok(waking),
            DeploymentState::Hibernating | DeploymentState::Hibernated | DeploymentState::Migrating => {
                if !deployment.observed.wake_requested {
                    let flagged = self.update(deployment_id, |d| {
                        let asleep = matches!(
                            d.state,
                            DeploymentState::Hibernating
                                | DeploymentState::Hibernated
                                | DeploymentState::Migrating
                        );
                        if !asleep || d.observed.wake_requested {
                            return Ok(false);
                        }
                        d.observed.wake_requested = true;
                        Ok(true)
                    })?;
                    if flagged.is_some() {
                        info!(deployment = %deployment_id, state = %deployment.state, "wake requested");
                    }
                }
                Ok(waking)
            }
            state @ (DeploymentState::Failed | DeploymentState::Deleting | DeploymentState::Deleted) => {
                Err(SchedulerError::NotServable {
                    id: deployment_id.to_string(),
                    state,
                })
            }
        }
    }

    /// Schedule a hibernated deployment to resume at `at` (epoch seconds).
    ///
    /// The activation applies to the next hibernation if the deployment is
    /// serving now. A later call replaces an earlier one.
    pub fn schedule_resume(&self, deployment_id: &str, at: u64) -> SchedulerResult<()> {
        let updated = self.update(deployment_id, |d| {
            if matches!(
                d.state,
                DeploymentState::Failed | DeploymentState::Deleting | DeploymentState::Deleted
            ) {
                return Err(SchedulerError::NotServable {
                    id: d.id.clone(),
                    state: d.state,
                });
            }
            if d.observed.wake_at == Some(at) {
                return Ok(false);
            }
            d.observed.wake_at = Some(at);
            Ok(true)
        })?;
        if let Some(d) = updated {
            info!(deployment = %deployment_id, at, state = %d.state, "activation scheduled");
        }
        Ok(())
    }

    pub fn get_deployment(&self, deployment_id: &str) -> SchedulerResult<Deployment> {
        self.store
            .read(deployment_id)?
            .map(|(d, _)| d)
            .ok_or_else(|| SchedulerError::DeploymentNotFound(deployment_id.to_string()))
    }

    pub fn list_deployments(&self, filter: &DeploymentFilter) -> SchedulerResult<Vec<Deployment>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|(d, _)| d)
            .filter(|d| filter.matches(d))
            .collect())
    }

    /// Journal of the actions emitted for a deployment, oldest first.
    pub fn list_actions(&self, deployment_id: &str) -> SchedulerResult<Vec<JournalEntry>> {
        Ok(self.store.list_journal(deployment_id)?)
    }

    /// Actions emitted since start, by kind.
    pub fn action_counts(&self) -> BTreeMap<&'static str, u64> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Tick ───────────────────────────────────────────────────────

    /// Capture a tick context from a metrics feed and run one tick.
    pub async fn tick_with_feed<F: MetricsFeed>(&self, feed: &F) -> SchedulerResult<TickReport> {
        let now = self.clock.now();
        let live: Vec<_> = self
            .store
            .list()?
            .into_iter()
            .filter(|(d, _)| !d.state.is_terminal())
            .map(|(d, _)| d.id)
            .collect();
        let ctx = TickContext::capture(feed, live, self.config.autoscale.window_secs, now).await;
        self.tick(&ctx).await
    }

    /// Run one reconciliation pass against a frozen context.
    pub async fn tick(&self, ctx: &TickContext) -> SchedulerResult<TickReport> {
        let mut guard = self.loop_state.lock().await;
        let LoopState { planner, events } = &mut *guard;
        let mut report = TickReport {
            now: ctx.now,
            ..TickReport::default()
        };

        self.drain_events(events, ctx.now, &mut report);

        for (deployment, version) in self.store.list()? {
            if deployment.state.is_terminal() {
                planner.forget(&deployment.id);
                continue;
            }
            report.evaluated += 1;
            let id = deployment.id.clone();
            if let Err(e) = self
                .reconcile(planner, deployment, version, ctx, &mut report)
                .await
            {
                warn!(deployment = %id, error = %e, "reconcile failed");
                report.errors += 1;
            }
        }

        self.drain_events(events, ctx.now, &mut report);

        debug!(
            now = ctx.now,
            evaluated = report.evaluated,
            emitted = report.emitted.len(),
            resubmitted = report.resubmitted,
            events = report.events_applied,
            errors = report.errors,
            "tick complete"
        );
        Ok(report)
    }

    async fn reconcile(
        &self,
        planner: &mut Planner,
        mut d: Deployment,
        version: u64,
        ctx: &TickContext,
        report: &mut TickReport,
    ) -> SchedulerResult<()> {
        if let Some(flight) = d.in_flight.clone() {
            return self.follow_up(d, version, flight, ctx.now, report).await;
        }

        match planner.plan(&d, ctx) {
            Ok(Some(kind)) => self.emit(d, version, kind, ctx.now, report).await,
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(deployment = %d.id, state = %d.state, error = %e, "no action possible");
                let message = e.to_string();
                if d.observed.last_error.as_deref() != Some(message.as_str()) {
                    d.observed.last_error = Some(message);
                    self.store.compare_and_swap(&d.id, version, &d)?;
                }
                Ok(())
            }
        }
    }

    /// Enforce the migration deadline and resubmit unacknowledged actions.
    async fn follow_up(
        &self,
        mut d: Deployment,
        version: u64,
        flight: InFlight,
        now: u64,
        report: &mut TickReport,
    ) -> SchedulerResult<()> {
        let action = flight.action;

        if d.migration.as_ref().is_some_and(|m| now > m.deadline_at) {
            let timeout = ControlError::MigrationTimeout(self.config.arbitrage.migration_deadline_secs);
            d.observed.last_error = Some(timeout.to_string());
            reconcile::rollback(&mut d, &action, now)?;
            if self.store.compare_and_swap(&d.id, version, &d)? {
                warn!(deployment = %d.id, action_id = action.id, state = %d.state, "migration deadline passed, rolled back");
                self.journal(&action, JournalStatus::Failed { reason: timeout.to_string() }, now)?;
                report.rolled_back += 1;
            }
            return Ok(());
        }

        if flight.acked {
            // Migrations answer to their deadline above.
            let acked_at = flight.acked_at.unwrap_or(flight.submitted_at);
            let timeout = self.config.outcome_timeout_secs;
            if matches!(action.kind, ActionKind::Migrate { .. }) || now <= acked_at + timeout {
                return Ok(());
            }
            let silent = ControlError::ExecutorUnreachable(format!(
                "{} acknowledged but no outcome within {timeout}s",
                action.kind.name()
            ));
            let failed = reconcile::fail(&mut d, &action, &silent, self.config.retry.budget, now)?;
            if self.store.compare_and_swap(&d.id, version, &d)? {
                self.journal(&action, JournalStatus::Failed { reason: silent.to_string() }, now)?;
                if failed {
                    error!(deployment = %d.id, action = action.kind.name(), "retry budget exhausted, deployment failed");
                    report.failed += 1;
                } else {
                    warn!(deployment = %d.id, action_id = action.id, action = action.kind.name(), state = %d.state, "outcome overdue, abandoned");
                    report.rolled_back += 1;
                }
            }
            return Ok(());
        }

        if now < flight.next_attempt_at {
            return Ok(());
        }

        if flight.attempts >= self.config.retry.budget {
            let unreachable = ControlError::ExecutorUnreachable(format!(
                "{} not acknowledged after {} attempts",
                action.kind.name(),
                flight.attempts
            ));
            let failed = reconcile::give_up(&mut d, &action, &unreachable, now)?;
            if self.store.compare_and_swap(&d.id, version, &d)? {
                self.journal(&action, JournalStatus::Failed { reason: unreachable.to_string() }, now)?;
                if failed {
                    error!(deployment = %d.id, action = action.kind.name(), "retry budget exhausted, deployment failed");
                    report.failed += 1;
                } else {
                    warn!(deployment = %d.id, action = action.kind.name(), state = %d.state, "gave up on action, rolled back");
                    report.rolled_back += 1;
                }
            }
            return Ok(());
        }

        let attempts = flight.attempts + 1;
        if let Some(f) = d.in_flight.as_mut() {
            f.attempts = attempts;
            f.submitted_at = now;
            f.next_attempt_at = now + self.config.retry.backoff_secs(attempts);
        }
        if !self.store.compare_and_swap(&d.id, version, &d)? {
            return Ok(());
        }
        info!(deployment = %d.id, action_id = action.id, action = action.kind.name(), attempt = attempts, "resubmitting");
        report.resubmitted += 1;
        let reply = self.submit(&action).await;
        self.settle(&action, reply, now, report)
    }

    // ── Emission ───────────────────────────────────────────────────

    async fn emit(
        &self,
        mut d: Deployment,
        version: u64,
        kind: ActionKind,
        now: u64,
        report: &mut TickReport,
    ) -> SchedulerResult<()> {
        let action = Action {
            id: self.next_action_id.fetch_add(1, Ordering::SeqCst),
            deployment_id: d.id.clone(),
            backend_kind: d.backend_kind,
            kind,
            version: version + 1,
            issued_at: now,
        };
        reconcile::begin(&mut d, &action, &self.config, now)?;
        if !self.store.compare_and_swap(&d.id, version, &d)? {
            debug!(deployment = %d.id, action = action.kind.name(), "record changed, skipping until next tick");
            return Ok(());
        }

        self.journal(&action, JournalStatus::Emitted, now)?;
        *self
            .emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(action.kind.name())
            .or_insert(0) += 1;
        info!(
            deployment = %d.id,
            action_id = action.id,
            action = action.kind.name(),
            version = action.version,
            state = %d.state,
            "action emitted"
        );
        report.emitted.push(action.clone());

        let reply = self.submit(&action).await;
        self.settle(&action, reply, now, report)
    }

    /// Hand an action to the executor and wait for its verdict.
    async fn submit(&self, action: &Action) -> Result<SubmitReply, ControlError> {
        let (reply, verdict) = oneshot::channel();
        let exchange = async {
            self.submissions
                .send(Submission {
                    action: action.clone(),
                    reply,
                })
                .await
                .map_err(|_| ControlError::ExecutorUnreachable("submission channel closed".to_string()))?;
            let reply = verdict
                .await
                .map_err(|_| ControlError::ExecutorUnreachable("executor dropped the reply".to_string()))?;
            Ok::<SubmitReply, ControlError>(reply)
        };

        let wait = Duration::from_secs(self.config.ack_timeout_secs);
        tokio::time::timeout(wait, exchange).await.map_err(|_| {
            ControlError::ExecutorUnreachable(format!("no reply within {}s", self.config.ack_timeout_secs))
        })?
    }

    /// Record the executor's verdict on a submission.
    fn settle(
        &self,
        action: &Action,
        reply: Result<SubmitReply, ControlError>,
        now: u64,
        report: &mut TickReport,
    ) -> SchedulerResult<()> {
        match reply {
            Ok(SubmitReply::Ack { version }) => {
                let acked = self.update_in_flight(action, |d| {
                    if let Some(f) = d.in_flight.as_mut() {
                        f.acked = true;
                        f.acked_at = Some(now);
                    }
                    Ok(())
                })?;
                if acked {
                    debug!(deployment = %action.deployment_id, action_id = action.id, version, "acknowledged");
                    self.journal(action, JournalStatus::Acknowledged, now)?;
                }
            }
            Ok(SubmitReply::Reject { reason }) => {
                warn!(deployment = %action.deployment_id, action = action.kind.name(), %reason, "action rejected");
                let rejected = ControlError::PolicyViolation(format!("{} rejected: {reason}", action.kind.name()));
                let budget = self.config.retry.budget;
                let mut failed = false;
                let applied = self.update_in_flight(action, |d| {
                    failed = reconcile::fail(d, action, &rejected, budget, now)?;
                    Ok(())
                })?;
                if applied {
                    self.journal(action, JournalStatus::Rejected { reason }, now)?;
                    if failed {
                        error!(deployment = %action.deployment_id, action = action.kind.name(), "retry budget exhausted, deployment failed");
                        report.failed += 1;
                    } else {
                        report.rolled_back += 1;
                    }
                }
            }
            Err(e) => {
                warn!(deployment = %action.deployment_id, action = action.kind.name(), error = %e, "submission not acknowledged, will retry");
                let message = e.to_string();
                self.update_in_flight(action, |d| {
                    d.observed.last_error = Some(message.clone());
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    // ── Executor events ────────────────────────────────────────────

    fn drain_events(
        &self,
        events: &mut mpsc::UnboundedReceiver<ExecutorEvent>,
        now: u64,
        report: &mut TickReport,
    ) {
        while let Ok(event) = events.try_recv() {
            match self.apply_event(event, now, report) {
                Ok(true) => report.events_applied += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "failed to apply executor event");
                    report.errors += 1;
                }
            }
        }
    }

    /// Apply one event. Returns `false` if it was stale or irrelevant.
    fn apply_event(&self, event: ExecutorEvent, now: u64, report: &mut TickReport) -> SchedulerResult<bool> {
        match event {
            ExecutorEvent::Observed {
                deployment_id,
                action_id,
                version,
                outcome,
            } => {
                let budget = self.config.retry.budget;
                let mut finished = None;
                let updated = self.update_existing(&deployment_id, |d| {
                    let Some(flight) = d
                        .in_flight
                        .as_ref()
                        .filter(|f| f.action.id == action_id && f.action.version == version)
                    else {
                        return Ok(false);
                    };
                    let action = flight.action.clone();
                    let (status, failed) = match &outcome {
                        ActionOutcome::Succeeded(observed) => {
                            reconcile::complete(d, &action, observed, now)?;
                            (JournalStatus::Completed, false)
                        }
                        ActionOutcome::Failed(err) => {
                            let failed = reconcile::fail(d, &action, err, budget, now)?;
                            (JournalStatus::Failed { reason: err.to_string() }, failed)
                        }
                    };
                    finished = Some((action, status, failed));
                    Ok(true)
                })?;

                let (Some(d), Some((action, status, failed))) = (updated, finished) else {
                    debug!(deployment = %deployment_id, action_id, version, "dropping stale executor event");
                    return Ok(false);
                };
                match &status {
                    JournalStatus::Failed { reason } if failed => {
                        error!(deployment = %d.id, action = action.kind.name(), %reason, "retry budget exhausted, deployment failed");
                        report.failed += 1;
                    }
                    JournalStatus::Failed { reason } => {
                        warn!(deployment = %d.id, action = action.kind.name(), %reason, state = %d.state, "action failed");
                        report.rolled_back += 1;
                    }
                    _ => info!(
                        deployment = %d.id,
                        action = action.kind.name(),
                        state = %d.state,
                        instances = d.observed.current_instances,
                        "action completed"
                    ),
                }
                self.journal(&action, status, now)?;
                Ok(true)
            }

            ExecutorEvent::Preempted {
                deployment_id,
                lost_instances,
            } => {
                if lost_instances == 0 {
                    return Ok(false);
                }
                let preemption = ControlError::Preemption(format!("{lost_instances} instances reclaimed"));
                let updated = self.update_existing(&deployment_id, |d| {
                    if d.state == DeploymentState::Deleted {
                        return Ok(false);
                    }
                    let previous = d.observed.current_instances;
                    d.observed.current_instances = previous.saturating_sub(lost_instances);
                    d.observed.last_error = Some(preemption.to_string());
                    if d.state == DeploymentState::Active && d.in_flight.is_none() {
                        d.observed.recovery_target = Some(d.scaling.clamp(previous));
                        d.transition(DeploymentState::Scaling, now)?;
                    }
                    Ok(true)
                })?;
                let Some(d) = updated else {
                    return Ok(false);
                };
                warn!(
                    deployment = %d.id,
                    lost_instances,
                    remaining = d.observed.current_instances,
                    state = %d.state,
                    "spot capacity reclaimed"
                );
                Ok(true)
            }

            ExecutorEvent::Traffic { deployment_id, at } => {
                let updated = self.update_existing(&deployment_id, |d| {
                    if d.state == DeploymentState::Deleted
                        || d.observed.last_request_at.is_some_and(|seen| seen >= at)
                    {
                        return Ok(false);
                    }
                    d.observed.last_request_at = Some(at);
                    Ok(true)
                })?;
                Ok(updated.is_some())
            }
        }
    }

    // ── Store helpers ──────────────────────────────────────────────

    /// Read, change and compare-and-swap a deployment, re-reading on a lost
    /// race. `change` returns `false` to leave the record untouched.
    fn update<F>(&self, deployment_id: &str, mut change: F) -> SchedulerResult<Option<Deployment>>
    where
        F: FnMut(&mut Deployment) -> SchedulerResult<bool>,
    {
        for _ in 0..CAS_ATTEMPTS {
            let (mut d, version) = self
                .store
                .read(deployment_id)?
                .ok_or_else(|| SchedulerError::DeploymentNotFound(deployment_id.to_string()))?;
            if !change(&mut d)? {
                return Ok(None);
            }
            if self.store.compare_and_swap(deployment_id, version, &d)? {
                return Ok(Some(d));
            }
            debug!(deployment = %deployment_id, "version moved, re-reading");
        }
        Err(SchedulerError::Conflict(deployment_id.to_string()))
    }

    /// Like `update`, but a missing deployment is not an error.
    fn update_existing<F>(&self, deployment_id: &str, change: F) -> SchedulerResult<Option<Deployment>>
    where
        F: FnMut(&mut Deployment) -> SchedulerResult<bool>,
    {
        match self.update(deployment_id, change) {
            Err(SchedulerError::DeploymentNotFound(_)) => Ok(None),
            other => other,
        }
    }

    /// Change a deployment only while `action` is still its in-flight action.
    fn update_in_flight<F>(&self, action: &Action, mut change: F) -> SchedulerResult<bool>
    where
        F: FnMut(&mut Deployment) -> SchedulerResult<()>,
    {
        let updated = self.update_existing(&action.deployment_id, |d| {
            let holds = d
                .in_flight
                .as_ref()
                .is_some_and(|f| f.action.id == action.id && f.action.version == action.version);
            if !holds {
                return Ok(false);
            }
            change(d)?;
            Ok(true)
        })?;
        Ok(updated.is_some())
    }

    /// Advance the journal entry of `action`. An entry already closed by a
    /// concurrent delete keeps its status.
    fn journal(&self, action: &Action, status: JournalStatus, now: u64) -> SchedulerResult<()> {
        let written = self.store.put_journal(&JournalEntry {
            action: action.clone(),
            status,
            updated_at: now,
        })?;
        if !written {
            debug!(deployment = %action.deployment_id, action_id = action.id, "journal entry already closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::{ExecutorEndpoint, ObservedState, executor_channel};
    use spotgrid_state::{
        BackendKind, CostPolicy, InstanceOffering, OfferingKey, PriceQuote, PricingSnapshot,
        ResourceRequirements, ScalingPolicy,
    };

    fn test_request(id: &str) -> DeploymentRequest {
        DeploymentRequest {
            id: id.to_string(),
            model_ref: "models/llama:7b".to_string(),
            backend_kind: BackendKind::Serverless,
            preferred_provider: Some("aws".to_string()),
            resources: ResourceRequirements {
                cpu_shares: 1000,
                memory_bytes: 2 << 30,
                accelerator: None,
                timeout_secs: 30,
            },
            scaling: ScalingPolicy {
                min_instances: 1,
                max_instances: 4,
                target_utilization: 0.7,
            },
            cost: CostPolicy {
                allow_spot: false,
                hibernation_enabled: false,
                idle_timeout_secs: 1800,
                allow_multi_cloud: false,
            },
        }
    }

    /// A scheduler with no executor serving the other end of the link.
    fn test_scheduler(now: u64) -> (Scheduler, ExecutorEndpoint, Arc<ManualClock>) {
        let store = DeploymentStore::open_in_memory().unwrap();
        let (link, endpoint) = executor_channel(8);
        let clock = Arc::new(ManualClock::new(now));
        let scheduler = Scheduler::new(store, ControllerConfig::default(), link)
            .unwrap()
            .with_clock(clock.clone());
        (scheduler, endpoint, clock)
    }

    fn aws_ctx(now: u64) -> TickContext {
        TickContext::new(
            now,
            PricingSnapshot::new(
                now,
                vec![InstanceOffering {
                    key: OfferingKey::new("aws", "us-east-1", "m5.large"),
                    cpu_shares: 2000,
                    memory_bytes: 8 << 30,
                    accelerator: None,
                    price: PriceQuote {
                        on_demand: 0.096,
                        spot: None,
                        trailing_on_demand: None,
                        trailing_spot: None,
                    },
                }],
            ),
        )
    }

    #[test]
    fn propose_starts_creating() {
        let (scheduler, _endpoint, _clock) = test_scheduler(1000);
        let d = scheduler.propose_deployment(test_request("default/chat")).unwrap();
        assert_eq!(d.state, DeploymentState::Creating);
        assert_eq!(d.created_at, 1000);
        assert!(d.placement.is_none());
        assert_eq!(scheduler.get_deployment("default/chat").unwrap(), d);
    }

    #[test]
    fn propose_rejects_bad_policy() {
        let (scheduler, _endpoint, _clock) = test_scheduler(1000);
        let mut request = test_request("default/chat");
        request.scaling.min_instances = 8;
        let err = scheduler.propose_deployment(request).unwrap_err();
        assert!(matches!(err, SchedulerError::Control(ControlError::PolicyViolation(_))));
        assert!(scheduler.get_deployment("default/chat").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn propose_duplicate_fails_until_deleted() {
        let (scheduler, endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();
        assert!(matches!(
            scheduler.propose_deployment(test_request("default/chat")),
            Err(SchedulerError::State(StateError::AlreadyExists(_)))
        ));

        // Never provisioned, yet still deleted through Deleting.
        scheduler.request_delete("default/chat").unwrap();
        let d = scheduler.get_deployment("default/chat").unwrap();
        assert_eq!(d.state, DeploymentState::Deleting);
        assert!(d.check_invariants().is_ok());
        assert!(matches!(
            scheduler.propose_deployment(test_request("default/chat")),
            Err(SchedulerError::State(StateError::AlreadyExists(_)))
        ));

        let report = scheduler.tick(&aws_ctx(1000)).await.unwrap();
        assert_eq!(report.emitted_for("default/chat"), vec!["terminate"]);
        let terminate = report.emitted[0].clone();
        endpoint
            .events
            .send(ExecutorEvent::Observed {
                deployment_id: "default/chat".to_string(),
                action_id: terminate.id,
                version: terminate.version,
                outcome: ActionOutcome::Succeeded(ObservedState {
                    instances: 0,
                    placement: None,
                }),
            })
            .unwrap();
        scheduler.tick(&aws_ctx(1001)).await.unwrap();
        assert_eq!(
            scheduler.get_deployment("default/chat").unwrap().state,
            DeploymentState::Deleted
        );

        let again = scheduler.propose_deployment(test_request("default/chat")).unwrap();
        assert_eq!(again.state, DeploymentState::Creating);
    }

    #[test]
    fn delete_is_idempotent() {
        let (scheduler, _endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();
        scheduler.request_delete("default/chat").unwrap();
        scheduler.request_delete("default/chat").unwrap();
        assert!(matches!(
            scheduler.request_delete("default/missing"),
            Err(SchedulerError::DeploymentNotFound(_))
        ));
    }

    #[test]
    fn resume_status_by_state() {
        let (scheduler, _endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();
        assert_eq!(
            scheduler.request_resume("default/chat").unwrap(),
            WakeStatus::Waking { retry_after_secs: 5 }
        );

        scheduler.request_delete("default/chat").unwrap();
        assert!(matches!(
            scheduler.request_resume("default/chat"),
            Err(SchedulerError::NotServable { state: DeploymentState::Deleting, .. })
        ));
    }

    #[test]
    fn schedule_resume_records_activation_time() {
        let (scheduler, _endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();

        scheduler.schedule_resume("default/chat", 5000).unwrap();
        scheduler.schedule_resume("default/chat", 4000).unwrap();
        let d = scheduler.get_deployment("default/chat").unwrap();
        assert_eq!(d.observed.wake_at, Some(4000));

        scheduler.request_delete("default/chat").unwrap();
        assert!(matches!(
            scheduler.schedule_resume("default/chat", 6000),
            Err(SchedulerError::NotServable { state: DeploymentState::Deleting, .. })
        ));
        assert!(matches!(
            scheduler.schedule_resume("default/missing", 6000),
            Err(SchedulerError::DeploymentNotFound(_))
        ));
    }

    #[test]
    fn list_filters_by_state() {
        let (scheduler, _endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("a")).unwrap();
        scheduler.propose_deployment(test_request("b")).unwrap();
        scheduler.request_delete("b").unwrap();

        let creating = scheduler
            .list_deployments(&DeploymentFilter {
                state: Some(DeploymentState::Creating),
                ..DeploymentFilter::default()
            })
            .unwrap();
        assert_eq!(creating.len(), 1);
        assert_eq!(creating[0].id, "a");
        assert_eq!(scheduler.list_deployments(&DeploymentFilter::default()).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_submission_stays_in_flight() {
        let (scheduler, _endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();

        let report = scheduler.tick(&aws_ctx(1000)).await.unwrap();
        assert_eq!(report.emitted_for("default/chat"), vec!["provision"]);

        let d = scheduler.get_deployment("default/chat").unwrap();
        let flight = d.in_flight.unwrap();
        assert!(!flight.acked);
        assert_eq!(flight.attempts, 1);
        assert_eq!(d.state, DeploymentState::Creating);
        assert!(d.observed.last_error.unwrap().contains("executor unreachable"));
        assert_eq!(scheduler.action_counts().get("provision"), Some(&1));

        let journal = scheduler.list_actions("default/chat").unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].status, JournalStatus::Emitted);
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_action_without_outcome_times_out() {
        let (scheduler, mut endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();
        tokio::spawn(async move {
            while let Some(submission) = endpoint.submissions.recv().await {
                let version = submission.action.version;
                let _ = submission.reply.send(SubmitReply::Ack { version });
            }
        });

        scheduler.tick(&aws_ctx(1000)).await.unwrap();
        let flight = scheduler
            .get_deployment("default/chat")
            .unwrap()
            .in_flight
            .unwrap();
        assert!(flight.acked);
        assert_eq!(flight.acked_at, Some(1000));

        // Within the outcome timeout the action is left alone.
        let report = scheduler.tick(&aws_ctx(1300)).await.unwrap();
        assert_eq!(report.rolled_back, 0);
        assert!(scheduler.get_deployment("default/chat").unwrap().in_flight.is_some());

        let report = scheduler.tick(&aws_ctx(1301)).await.unwrap();
        assert_eq!(report.rolled_back, 1);
        let d = scheduler.get_deployment("default/chat").unwrap();
        assert!(d.in_flight.is_none());
        assert_eq!(d.retries, 1);
        assert_eq!(d.state, DeploymentState::Creating);
        assert!(d.observed.last_error.unwrap().contains("no outcome within 300s"));

        let journal = scheduler.list_actions("default/chat").unwrap();
        assert!(matches!(journal[0].status, JournalStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_events_are_dropped() {
        let (scheduler, endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();
        scheduler.tick(&aws_ctx(1000)).await.unwrap();
        let flight = scheduler
            .get_deployment("default/chat")
            .unwrap()
            .in_flight
            .unwrap();

        let observed = ActionOutcome::Succeeded(ObservedState {
            instances: 1,
            placement: Some(OfferingKey::new("aws", "us-east-1", "m5.large").placement(false)),
        });
        endpoint
            .events
            .send(ExecutorEvent::Observed {
                deployment_id: "default/chat".to_string(),
                action_id: flight.action.id,
                version: flight.action.version + 7,
                outcome: observed.clone(),
            })
            .unwrap();
        // Before the first back-off expires, so nothing is resubmitted.
        let report = scheduler.tick(&aws_ctx(1001)).await.unwrap();
        assert_eq!(report.events_applied, 0);
        assert_eq!(
            scheduler.get_deployment("default/chat").unwrap().state,
            DeploymentState::Creating
        );

        endpoint
            .events
            .send(ExecutorEvent::Observed {
                deployment_id: "default/chat".to_string(),
                action_id: flight.action.id,
                version: flight.action.version,
                outcome: observed,
            })
            .unwrap();
        let report = scheduler.tick(&aws_ctx(1001)).await.unwrap();
        assert_eq!(report.events_applied, 1);
        let d = scheduler.get_deployment("default/chat").unwrap();
        assert_eq!(d.state, DeploymentState::Active);
        assert_eq!(d.observed.current_instances, 1);
        assert!(d.in_flight.is_none());
    }

    #[tokio::test]
    async fn traffic_only_moves_forward() {
        let (scheduler, endpoint, _clock) = test_scheduler(1000);
        scheduler.propose_deployment(test_request("default/chat")).unwrap();
        for at in [1500, 1200] {
            endpoint
                .events
                .send(ExecutorEvent::Traffic {
                    deployment_id: "default/chat".to_string(),
                    at,
                })
                .unwrap();
        }
        let report = scheduler.tick(&TickContext::new(1600, PricingSnapshot::default())).await.unwrap();
        assert_eq!(report.events_applied, 1);
        let d = scheduler.get_deployment("default/chat").unwrap();
        assert_eq!(d.observed.last_request_at, Some(1500));
    }

    #[test]
    fn action_ids_continue_after_restart() {
        let store = DeploymentStore::open_in_memory().unwrap();
        store
            .put_journal(&JournalEntry {
                action: Action {
                    id: 41,
                    deployment_id: "x".to_string(),
                    backend_kind: BackendKind::Serverless,
                    kind: ActionKind::Terminate,
                    version: 3,
                    issued_at: 0,
                },
                status: JournalStatus::Completed,
                updated_at: 0,
            })
            .unwrap();
        let (link, _endpoint) = executor_channel(1);
        let scheduler = Scheduler::new(store, ControllerConfig::default(), link).unwrap();
        assert_eq!(scheduler.next_action_id.load(Ordering::SeqCst), 42);
    }
}
