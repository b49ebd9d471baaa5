//! Reconciliation decisions and the state changes that follow them.
//!
//! `Planner` picks at most one action per deployment per tick. The free
//! functions below apply the lifecycle consequences of emitting an action,
//! of its confirmation, and of its failure. None of them touch the store;
//! the scheduler persists the result with a compare-and-swap.

use tracing::debug;

use spotgrid_arbitrage::{ArbitrageDecision, ArbitrageEngine};
use spotgrid_autoscale::{Autoscaler, RightSizer, ScaleDecision};
use spotgrid_cost::cheapest;
use spotgrid_hibernation::{HibernationDecision, HibernationManager, resume_instances};
use spotgrid_state::{
    Action, ActionKind, Deployment, DeploymentState, InFlight, MigrationRecord, StateResult,
};

use crate::config::ControllerConfig;
use crate::context::TickContext;
use crate::error::ControlError;
use crate::executor::ObservedState;

// ── Planning ───────────────────────────────────────────────────────

/// The decision components, with the per-deployment memory they keep
/// across ticks (scale-down dwell, low-usage dwell, arbitrage streaks).
pub struct Planner {
    pub autoscaler: Autoscaler,
    pub rightsizer: RightSizer,
    pub hibernation: HibernationManager,
    pub arbitrage: ArbitrageEngine,
}

impl Planner {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            autoscaler: Autoscaler::new(config.autoscale.clone()),
            rightsizer: RightSizer::new(config.autoscale.right_size.clone()),
            hibernation: HibernationManager::new(config.hibernation.clone()),
            arbitrage: ArbitrageEngine::new(config.arbitrage.clone()),
        }
    }

    pub fn forget(&mut self, deployment_id: &str) {
        self.autoscaler.forget(deployment_id);
        self.rightsizer.forget(deployment_id);
        self.arbitrage.forget(deployment_id);
    }

    /// Choose the single action for an idle deployment, if any.
    ///
    /// Precedence: terminate > initial or recovery provision > suspend/resume
    /// > resize > reshape > migrate.
    pub fn plan(&mut self, d: &Deployment, ctx: &TickContext) -> Result<Option<ActionKind>, ControlError> {
        match d.state {
            DeploymentState::Deleting => return Ok(Some(ActionKind::Terminate)),
            DeploymentState::Creating => return initial_provision(d, ctx).map(Some),
            DeploymentState::Scaling => return recovery_provision(d).map(Some),
            DeploymentState::Active | DeploymentState::Hibernated => {}
            _ => return Ok(None),
        }

        let window = ctx.window(&d.id);

        match self.hibernation.evaluate(d, &window, &ctx.pricing, ctx.now) {
            HibernationDecision::Suspend { .. } => return Ok(Some(ActionKind::Suspend)),
            HibernationDecision::Resume { instances, .. } => {
                return Ok(Some(ActionKind::Resume { instances }));
            }
            HibernationDecision::NoChange => {}
        }

        if let ScaleDecision::ScaleTo(to) = self.autoscaler.evaluate(d, &window, ctx.now) {
            let from = d.observed.current_instances;
            return Ok(Some(ActionKind::Resize { from, to }));
        }

        if let Some(to) = self.rightsizer.evaluate(d, &window, ctx.now) {
            return Ok(Some(ActionKind::Reshape {
                from: d.resources.clone(),
                to,
            }));
        }

        if let ArbitrageDecision::Migrate(proposal) = self.arbitrage.evaluate(d, &ctx.pricing) {
            // A confirmed migration leaves the deployment Active, so a
            // hibernated one comes up at the new placement.
            let instances = if d.state == DeploymentState::Hibernated {
                resume_instances(&d.scaling)
            } else {
                d.observed.current_instances
            };
            return Ok(Some(ActionKind::Migrate {
                from: proposal.from,
                to: proposal.to,
                instances,
            }));
        }

        Ok(None)
    }
}

/// First placement: the cheapest offering that fits, restricted to the
/// preferred provider unless multi-cloud placement is allowed.
fn initial_provision(d: &Deployment, ctx: &TickContext) -> Result<ActionKind, ControlError> {
    let provider = if d.cost.allow_multi_cloud {
        None
    } else {
        d.preferred_provider.as_deref()
    };
    let candidate = cheapest(&d.resources, &ctx.pricing, d.cost.allow_spot, provider).ok_or_else(|| {
        ControlError::Provision(format!(
            "no offering fits {} millicores / {} bytes{}",
            d.resources.cpu_shares,
            d.resources.memory_bytes,
            provider.map(|p| format!(" on {p}")).unwrap_or_default()
        ))
    })?;
    debug!(
        deployment = %d.id,
        offering = %candidate.placement.offering_key(),
        spot = candidate.placement.spot,
        cost = candidate.cost,
        "initial placement"
    );
    Ok(ActionKind::Provision {
        placement: candidate.placement,
        instances: resume_instances(&d.scaling),
    })
}

/// Bring reclaimed capacity back on on-demand instances of the same class.
fn recovery_provision(d: &Deployment) -> Result<ActionKind, ControlError> {
    let placement = d
        .placement
        .as_ref()
        .ok_or_else(|| ControlError::Preemption(format!("{} has no placement to recover", d.id)))?;
    let target = d
        .observed
        .recovery_target
        .unwrap_or(d.observed.current_instances);
    Ok(ActionKind::Provision {
        placement: placement.offering_key().placement(false),
        instances: d.scaling.clamp(target.max(1)),
    })
}

// ── Lifecycle consequences ─────────────────────────────────────────

/// Record `action` as in flight and apply its tentative transition.
pub fn begin(d: &mut Deployment, action: &Action, config: &ControllerConfig, now: u64) -> StateResult<()> {
    match &action.kind {
        ActionKind::Resize { .. } | ActionKind::Reshape { .. } => d.transition(DeploymentState::Scaling, now)?,
        ActionKind::Suspend => d.transition(DeploymentState::Hibernating, now)?,
        ActionKind::Migrate { from, to, .. } => {
            let prior_state = d.state;
            d.transition(DeploymentState::Migrating, now)?;
            d.migration = Some(MigrationRecord {
                from: from.clone(),
                to: to.clone(),
                prior_state,
                started_at: now,
                deadline_at: now + config.arbitrage.migration_deadline_secs,
            });
        }
        ActionKind::Provision { .. } | ActionKind::Resume { .. } | ActionKind::Terminate => {}
    }
    d.in_flight = Some(InFlight {
        action: action.clone(),
        attempts: 1,
        acked: false,
        acked_at: None,
        submitted_at: now,
        next_attempt_at: now + config.retry.backoff_secs(1),
    });
    Ok(())
}

/// Apply a confirmed action.
pub fn complete(d: &mut Deployment, action: &Action, observed: &ObservedState, now: u64) -> StateResult<()> {
    match &action.kind {
        ActionKind::Provision { placement, .. } => {
            d.placement = Some(observed.placement.clone().unwrap_or_else(|| placement.clone()));
            d.observed.recovery_target = None;
            d.observed.current_instances = observed.instances;
            d.transition(DeploymentState::Active, now)?;
        }
        ActionKind::Resize { .. } => {
            d.observed.current_instances = observed.instances;
            d.transition(DeploymentState::Active, now)?;
        }
        ActionKind::Reshape { to, .. } => {
            d.resources = to.clone();
            d.observed.current_instances = observed.instances;
            d.transition(DeploymentState::Active, now)?;
        }
        ActionKind::Suspend => {
            d.observed.current_instances = 0;
            // An activation time that passed while serving is spent.
            if d.observed.wake_at.is_some_and(|at| at <= now) {
                d.observed.wake_at = None;
            }
            d.transition(DeploymentState::Hibernated, now)?;
        }
        ActionKind::Resume { .. } => {
            d.observed.current_instances = observed.instances;
            d.transition(DeploymentState::Active, now)?;
        }
        ActionKind::Migrate { to, .. } => {
            d.migration = None;
            d.placement = Some(observed.placement.clone().unwrap_or_else(|| to.clone()));
            d.observed.current_instances = observed.instances;
            d.transition(DeploymentState::Active, now)?;
        }
        ActionKind::Terminate => {
            d.placement = None;
            d.migration = None;
            d.observed.current_instances = 0;
            d.transition(DeploymentState::Deleted, now)?;
        }
    }
    d.in_flight = None;
    d.retries = 0;
    d.observed.last_reconciled_at = Some(now);
    settle_wake(d, now);
    Ok(())
}

/// A serving deployment has no pending wake request or due activation.
fn settle_wake(d: &mut Deployment, now: u64) {
    if d.state == DeploymentState::Active {
        d.observed.wake_requested = false;
        if d.observed.wake_at.is_some_and(|at| at <= now) {
            d.observed.wake_at = None;
        }
    }
}

/// Undo the tentative transition of an action that will not complete.
pub fn rollback(d: &mut Deployment, action: &Action, now: u64) -> StateResult<()> {
    match &action.kind {
        ActionKind::Resize { .. } | ActionKind::Reshape { .. } if d.state == DeploymentState::Scaling => {
            d.transition(DeploymentState::Active, now)?;
        }
        ActionKind::Suspend if d.state == DeploymentState::Hibernating => {
            d.transition(DeploymentState::Active, now)?;
        }
        ActionKind::Migrate { .. } => {
            if let Some(m) = d.migration.take() {
                d.placement = Some(m.from);
                d.transition(m.prior_state, now)?;
            }
        }
        _ => {}
    }
    d.in_flight = None;
    settle_wake(d, now);
    Ok(())
}

/// Move to Failed. A failed migration keeps its source placement; a failed
/// first provision records the placement it attempted.
fn mark_failed(d: &mut Deployment, action: &Action, now: u64) -> StateResult<()> {
    if let Some(migration) = d.migration.take() {
        d.placement = Some(migration.from);
    }
    if d.placement.is_none()
        && let ActionKind::Provision { placement, .. } = &action.kind
    {
        d.placement = Some(placement.clone());
    }
    d.in_flight = None;
    d.transition(DeploymentState::Failed, now)
}

/// Whether an action's failure counts against the retry budget.
fn is_budgeted(action: &Action) -> bool {
    matches!(
        action.kind,
        ActionKind::Provision { .. }
            | ActionKind::Resize { .. }
            | ActionKind::Reshape { .. }
            | ActionKind::Migrate { .. }
    )
}

/// Apply a failed or rejected action. Returns `true` if the deployment is now Failed.
pub fn fail(
    d: &mut Deployment,
    action: &Action,
    error: &ControlError,
    budget: u32,
    now: u64,
) -> StateResult<bool> {
    d.observed.last_error = Some(error.to_string());
    if is_budgeted(action) {
        d.retries += 1;
        if d.retries >= budget {
            mark_failed(d, action, now)?;
            return Ok(true);
        }
    }
    rollback(d, action, now)?;
    Ok(false)
}

/// Abandon an action the executor never acknowledged within the retry budget.
///
/// Budgeted transitions (provision, resize, reshape, migrate) fail the
/// deployment; suspend, resume and terminate roll back and are planned again.
pub fn give_up(d: &mut Deployment, action: &Action, error: &ControlError, now: u64) -> StateResult<bool> {
    d.observed.last_error = Some(error.to_string());
    if is_budgeted(action) {
        mark_failed(d, action, now)?;
        return Ok(true);
    }
    rollback(d, action, now)?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgrid_state::{
        BackendKind, CostPolicy, DeploymentRequest, InstanceOffering, OfferingKey, Placement,
        PriceQuote, PricingSnapshot, ResourceRequirements, ScalingPolicy,
    };

    fn test_deployment() -> Deployment {
        DeploymentRequest {
            id: "default/api".to_string(),
            model_ref: "models/bert:1".to_string(),
            backend_kind: BackendKind::OrchestratedCluster,
            preferred_provider: Some("aws".to_string()),
            resources: ResourceRequirements {
                cpu_shares: 2000,
                memory_bytes: 4 << 30,
                accelerator: None,
                timeout_secs: 30,
            },
            scaling: ScalingPolicy {
                min_instances: 1,
                max_instances: 6,
                target_utilization: 0.7,
            },
            cost: CostPolicy {
                allow_spot: false,
                hibernation_enabled: false,
                idle_timeout_secs: 1800,
                allow_multi_cloud: false,
            },
        }
        .into_deployment(100)
    }

    fn aws() -> Placement {
        OfferingKey::new("aws", "us-east-1", "m5.xlarge").placement(false)
    }

    fn gcp() -> Placement {
        OfferingKey::new("gcp", "us-central1", "n2-standard-4").placement(false)
    }

    fn ctx(now: u64) -> TickContext {
        let offering = |key: OfferingKey, price: f64| InstanceOffering {
            key,
            cpu_shares: 4000,
            memory_bytes: 16 << 30,
            accelerator: None,
            price: PriceQuote {
                on_demand: price,
                spot: Some(price / 3.0),
                trailing_on_demand: None,
                trailing_spot: None,
            },
        };
        TickContext::new(
            now,
            PricingSnapshot::new(
                now,
                vec![
                    offering(aws().offering_key(), 0.20),
                    offering(gcp().offering_key(), 0.10),
                ],
            ),
        )
    }

    fn action(kind: ActionKind) -> Action {
        Action {
            id: 1,
            deployment_id: "default/api".to_string(),
            backend_kind: BackendKind::OrchestratedCluster,
            kind,
            version: 2,
            issued_at: 100,
        }
    }

    fn active(instances: u32) -> Deployment {
        let mut d = test_deployment();
        d.state = DeploymentState::Active;
        d.placement = Some(aws());
        d.observed.current_instances = instances;
        d
    }

    #[test]
    fn creating_provisions_on_preferred_provider() {
        let mut planner = Planner::new(&ControllerConfig::default());
        let d = test_deployment();
        match planner.plan(&d, &ctx(200)).unwrap() {
            Some(ActionKind::Provision { placement, instances }) => {
                assert_eq!(placement, aws());
                assert_eq!(instances, 1);
            }
            other => panic!("expected provision, got {other:?}"),
        }
    }

    #[test]
    fn multi_cloud_creating_takes_global_cheapest() {
        let mut planner = Planner::new(&ControllerConfig::default());
        let mut d = test_deployment();
        d.cost.allow_multi_cloud = true;
        d.cost.allow_spot = true;
        match planner.plan(&d, &ctx(200)).unwrap() {
            Some(ActionKind::Provision { placement, .. }) => {
                assert_eq!(placement.provider, "gcp");
                assert!(placement.spot);
            }
            other => panic!("expected provision, got {other:?}"),
        }
    }

    #[test]
    fn creating_without_fitting_offering_is_an_error() {
        let mut planner = Planner::new(&ControllerConfig::default());
        let mut d = test_deployment();
        d.resources.cpu_shares = 64_000;
        assert!(matches!(planner.plan(&d, &ctx(200)), Err(ControlError::Provision(_))));
    }

    #[test]
    fn deleting_always_terminates() {
        let mut planner = Planner::new(&ControllerConfig::default());
        let mut d = active(2);
        d.state = DeploymentState::Deleting;
        assert_eq!(planner.plan(&d, &ctx(200)).unwrap(), Some(ActionKind::Terminate));
    }

    #[test]
    fn recovery_goes_on_demand() {
        let mut planner = Planner::new(&ControllerConfig::default());
        let mut d = active(1);
        d.placement = Some(OfferingKey::new("aws", "us-east-1", "m5.xlarge").placement(true));
        d.state = DeploymentState::Scaling;
        d.observed.recovery_target = Some(3);
        assert_eq!(
            planner.plan(&d, &ctx(200)).unwrap(),
            Some(ActionKind::Provision {
                placement: aws(),
                instances: 3
            })
        );
    }

    #[test]
    fn begin_and_complete_resize() {
        let config = ControllerConfig::default();
        let mut d = active(2);
        let a = action(ActionKind::Resize { from: 2, to: 4 });

        begin(&mut d, &a, &config, 200).unwrap();
        assert_eq!(d.state, DeploymentState::Scaling);
        assert_eq!(d.in_flight.as_ref().map(|f| f.next_attempt_at), Some(202));

        complete(&mut d, &a, &ObservedState { instances: 4, placement: Some(aws()) }, 210).unwrap();
        assert_eq!(d.state, DeploymentState::Active);
        assert_eq!(d.observed.current_instances, 4);
        assert!(d.in_flight.is_none());
        assert!(d.check_invariants().is_ok());
    }

    #[test]
    fn migration_rolls_back_to_prior_state() {
        let config = ControllerConfig::default();
        let mut d = active(2);
        let a = action(ActionKind::Migrate { from: aws(), to: gcp(), instances: 2 });

        begin(&mut d, &a, &config, 200).unwrap();
        assert_eq!(d.state, DeploymentState::Migrating);
        assert_eq!(d.migration.as_ref().map(|m| m.deadline_at), Some(800));

        rollback(&mut d, &a, 900).unwrap();
        assert_eq!(d.state, DeploymentState::Active);
        assert_eq!(d.placement, Some(aws()));
        assert!(d.migration.is_none());
    }

    #[test]
    fn hibernated_migration_comes_up_active() {
        let config = ControllerConfig::default();
        let mut d = active(0);
        d.scaling.min_instances = 0;
        d.cost.allow_multi_cloud = true;
        d.state = DeploymentState::Hibernated;

        let mut planner = Planner::new(&config);
        assert_eq!(planner.plan(&d, &ctx(200)).unwrap(), None);
        let kind = planner.plan(&d, &ctx(230)).unwrap();
        assert_eq!(
            kind,
            Some(ActionKind::Migrate { from: aws(), to: gcp(), instances: 1 })
        );

        let a = action(ActionKind::Migrate { from: aws(), to: gcp(), instances: 1 });
        begin(&mut d, &a, &config, 230).unwrap();
        complete(&mut d, &a, &ObservedState { instances: 1, placement: Some(gcp()) }, 240).unwrap();
        assert_eq!(d.state, DeploymentState::Active);
        assert_eq!(d.placement, Some(gcp()));
        assert_eq!(d.observed.current_instances, 1);
        assert!(d.migration.is_none());
        assert!(d.check_invariants().is_ok());
    }

    #[test]
    fn failed_migrations_exhaust_budget_at_source_placement() {
        let config = ControllerConfig::default();
        let mut d = active(2);
        let a = action(ActionKind::Migrate { from: aws(), to: gcp(), instances: 2 });
        let err = ControlError::Provision("gcp capacity".to_string());

        for _ in 0..2 {
            begin(&mut d, &a, &config, 200).unwrap();
            assert!(!fail(&mut d, &a, &err, 3, 210).unwrap());
            assert_eq!(d.state, DeploymentState::Active);
            assert_eq!(d.placement, Some(aws()));
        }
        begin(&mut d, &a, &config, 220).unwrap();
        assert!(fail(&mut d, &a, &err, 3, 230).unwrap());
        assert_eq!(d.state, DeploymentState::Failed);
        assert_eq!(d.placement, Some(aws()));
        assert!(d.migration.is_none());
        assert!(d.check_invariants().is_ok());
    }

    #[test]
    fn reshape_applies_new_shape() {
        let config = ControllerConfig::default();
        let mut d = active(2);
        let mut smaller = d.resources.clone();
        smaller.cpu_shares = 1500;
        let a = action(ActionKind::Reshape { from: d.resources.clone(), to: smaller.clone() });

        begin(&mut d, &a, &config, 200).unwrap();
        assert_eq!(d.state, DeploymentState::Scaling);
        rollback(&mut d, &a, 205).unwrap();
        assert_eq!(d.state, DeploymentState::Active);
        assert_eq!(d.resources.cpu_shares, 2000);

        begin(&mut d, &a, &config, 210).unwrap();
        complete(&mut d, &a, &ObservedState { instances: 2, placement: Some(aws()) }, 220).unwrap();
        assert_eq!(d.state, DeploymentState::Active);
        assert_eq!(d.resources, smaller);
        assert_eq!(d.observed.current_instances, 2);
    }

    #[test]
    fn low_usage_reshapes_after_resize_precedence() {
        let mut config = ControllerConfig::default();
        config.autoscale.right_size.dwell_secs = 0;
        let mut planner = Planner::new(&config);
        let d = active(1);
        let quiet = |now: u64, cpu: f64| {
            ctx(now).with_window(spotgrid_state::MetricsWindow {
                deployment_id: d.id.clone(),
                samples: vec![spotgrid_state::MetricsSample {
                    at: now,
                    request_rate: 2.0,
                    latency_p50_ms: 5.0,
                    latency_p95_ms: 15.0,
                    error_rate: 0.0,
                    cpu_util: cpu,
                    mem_util: 0.5,
                }],
            })
        };

        match planner.plan(&d, &quiet(200, 0.1)).unwrap() {
            Some(ActionKind::Reshape { from, to }) => {
                assert_eq!(from.cpu_shares, 2000);
                assert_eq!(to.cpu_shares, 1500);
                assert_eq!(to.memory_bytes, from.memory_bytes);
            }
            other => panic!("expected reshape, got {other:?}"),
        }

        // A busy deployment is resized instead.
        let mut busy = active(1);
        assert!(matches!(
            planner.plan(&busy, &quiet(300, 0.95)).unwrap(),
            Some(ActionKind::Resize { from: 1, .. })
        ));
    }

    #[test]
    fn provision_failures_exhaust_budget() {
        let config = ControllerConfig::default();
        let mut d = test_deployment();
        let a = action(ActionKind::Provision { placement: aws(), instances: 1 });
        let err = ControlError::Provision("capacity".to_string());

        for _ in 0..2 {
            begin(&mut d, &a, &config, 200).unwrap();
            assert!(!fail(&mut d, &a, &err, 3, 210).unwrap());
            assert_eq!(d.state, DeploymentState::Creating);
        }
        begin(&mut d, &a, &config, 220).unwrap();
        assert!(fail(&mut d, &a, &err, 3, 230).unwrap());
        assert_eq!(d.state, DeploymentState::Failed);
        assert_eq!(d.placement, Some(aws()));
        assert_eq!(d.observed.last_error.as_deref(), Some("provision failed: capacity"));
        assert!(d.check_invariants().is_ok());
    }

    #[test]
    fn unacknowledged_suspend_is_rolled_back_not_failed() {
        let config = ControllerConfig::default();
        let mut d = active(1);
        d.scaling.min_instances = 0;
        let a = action(ActionKind::Suspend);
        begin(&mut d, &a, &config, 200).unwrap();
        assert_eq!(d.state, DeploymentState::Hibernating);

        let failed = give_up(&mut d, &a, &ControlError::ExecutorUnreachable("timeout".to_string()), 300).unwrap();
        assert!(!failed);
        assert_eq!(d.state, DeploymentState::Active);
        assert!(d.in_flight.is_none());
    }

    #[test]
    fn unacknowledged_migration_fails_at_source_placement() {
        let config = ControllerConfig::default();
        let mut d = active(2);
        let a = action(ActionKind::Migrate { from: aws(), to: gcp(), instances: 2 });
        begin(&mut d, &a, &config, 200).unwrap();

        let failed = give_up(&mut d, &a, &ControlError::ExecutorUnreachable("timeout".to_string()), 300).unwrap();
        assert!(failed);
        assert_eq!(d.state, DeploymentState::Failed);
        assert_eq!(d.placement, Some(aws()));
    }

    #[test]
    fn resume_clears_due_activation_only() {
        let config = ControllerConfig::default();
        let mut d = active(0);
        d.scaling.min_instances = 0;
        d.state = DeploymentState::Hibernated;
        d.observed.wake_at = Some(500);
        let a = action(ActionKind::Resume { instances: 1 });
        begin(&mut d, &a, &config, 500).unwrap();
        complete(&mut d, &a, &ObservedState { instances: 1, placement: Some(aws()) }, 505).unwrap();
        assert_eq!(d.state, DeploymentState::Active);
        assert_eq!(d.observed.wake_at, None);

        // A future activation survives the next wake-up.
        let mut d = active(0);
        d.scaling.min_instances = 0;
        d.state = DeploymentState::Hibernated;
        d.observed.wake_requested = true;
        d.observed.wake_at = Some(9000);
        begin(&mut d, &a, &config, 500).unwrap();
        complete(&mut d, &a, &ObservedState { instances: 1, placement: Some(aws()) }, 505).unwrap();
        assert!(!d.observed.wake_requested);
        assert_eq!(d.observed.wake_at, Some(9000));
    }

    #[test]
    fn terminate_clears_placement() {
        let config = ControllerConfig::default();
        let mut d = active(2);
        d.transition(DeploymentState::Deleting, 150).unwrap();
        let a = action(ActionKind::Terminate);
        begin(&mut d, &a, &config, 200).unwrap();
        complete(&mut d, &a, &ObservedState { instances: 0, placement: None }, 210).unwrap();
        assert_eq!(d.state, DeploymentState::Deleted);
        assert!(d.placement.is_none());
        assert!(d.check_invariants().is_ok());
    }
}
