//! Arbitrage engine — debounced migration proposals.
//!
//! Each evaluation either extends the streak of the current best candidate,
//! starts a new streak for a different candidate, or clears the streak when
//! nothing qualifies. A proposal is made when a streak reaches
//! `debounce_ticks`, after which the streak is cleared.

use std::collections::HashMap;

use tracing::{debug, info};

use spotgrid_cost::{Candidate, estimate, estimate_trailing, rank_offerings};
use spotgrid_state::{Deployment, DeploymentId, DeploymentState, Placement, PricingSnapshot};

use crate::config::ArbitrageConfig;

/// A migration the scheduler may act on.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationProposal {
    pub from: Placement,
    pub to: Placement,
    /// Cost per replica-hour at `from`.
    pub current_cost: f64,
    /// Cost per replica-hour at `to`.
    pub candidate_cost: f64,
    /// Fraction of the current cost saved (0.2 = 20%).
    pub savings: f64,
    /// Hourly saving at the deployment's current size.
    pub hourly_savings: f64,
}

/// Outcome of one arbitrage evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrageDecision {
    /// Propose moving to a cheaper placement.
    Migrate(MigrationProposal),
    /// A candidate qualifies but has not yet won enough consecutive evaluations.
    Pending { candidate: Placement, streak: u32 },
    /// No cheaper placement qualifies.
    NoChange,
}

/// Consecutive wins of one candidate.
#[derive(Debug, Clone)]
struct Streak {
    candidate: Placement,
    count: u32,
}

pub struct ArbitrageEngine {
    config: ArbitrageConfig,
    streaks: HashMap<DeploymentId, Streak>,
}

impl ArbitrageEngine {
    pub fn new(config: ArbitrageConfig) -> Self {
        Self {
            config,
            streaks: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ArbitrageConfig {
        &self.config
    }

    /// Drop the debounce streak of a deployment.
    pub fn forget(&mut self, deployment_id: &str) {
        self.streaks.remove(deployment_id);
    }

    /// Current streak length for a deployment (0 if none).
    pub fn streak(&self, deployment_id: &str) -> u32 {
        self.streaks.get(deployment_id).map_or(0, |s| s.count)
    }

    /// Evaluate one deployment against the snapshot.
    pub fn evaluate(&mut self, deployment: &Deployment, snapshot: &PricingSnapshot) -> ArbitrageDecision {
        if !deployment.cost.allow_multi_cloud
            || !matches!(
                deployment.state,
                DeploymentState::Active | DeploymentState::Hibernated
            )
        {
            self.forget(&deployment.id);
            return ArbitrageDecision::NoChange;
        }
        let Some(current) = &deployment.placement else {
            self.forget(&deployment.id);
            return ArbitrageDecision::NoChange;
        };

        let shape = &deployment.resources;
        let current_key = current.offering_key();
        let Some(current_cost) = estimate(shape, &current_key, snapshot, current.spot) else {
            debug!(deployment = %deployment.id, offering = %current_key, "current offering not priced");
            self.forget(&deployment.id);
            return ArbitrageDecision::NoChange;
        };
        let current_trailing = estimate_trailing(shape, &current_key, snapshot, current.spot);

        let best = rank_offerings(shape, snapshot, deployment.cost.allow_spot, None)
            .into_iter()
            .filter(|c| c.placement != *current)
            .find(|c| self.qualifies(c, current_cost, current_trailing));

        let Some(best) = best else {
            self.forget(&deployment.id);
            return ArbitrageDecision::NoChange;
        };

        let count = match self.streaks.get(&deployment.id) {
            Some(streak) if streak.candidate == best.placement => streak.count + 1,
            _ => 1,
        };
        let savings = (current_cost - best.cost) / current_cost;

        if count >= self.config.debounce_ticks {
            self.forget(&deployment.id);
            let instances = f64::from(deployment.observed.current_instances);
            let proposal = MigrationProposal {
                from: current.clone(),
                to: best.placement,
                current_cost,
                candidate_cost: best.cost,
                savings,
                hourly_savings: (current_cost - best.cost) * instances,
            };
            info!(
                deployment = %deployment.id,
                from = %proposal.from.offering_key(),
                to = %proposal.to.offering_key(),
                spot = proposal.to.spot,
                savings_pct = savings * 100.0,
                hourly_savings = proposal.hourly_savings,
                "proposing migration"
            );
            return ArbitrageDecision::Migrate(proposal);
        }

        debug!(
            deployment = %deployment.id,
            candidate = %best.placement.offering_key(),
            spot = best.placement.spot,
            savings,
            streak = count,
            "cheaper candidate seen"
        );
        self.streaks.insert(
            deployment.id.clone(),
            Streak {
                candidate: best.placement.clone(),
                count,
            },
        );
        ArbitrageDecision::Pending {
            candidate: best.placement,
            streak: count,
        }
    }

    /// Whether a candidate beats the current cost by more than the margin and,
    /// when trailing prices are known on both sides, is cheaper on those too.
    fn qualifies(&self, candidate: &Candidate, current_cost: f64, current_trailing: Option<f64>) -> bool {
        if current_cost <= 0.0 {
            return false;
        }
        let savings = (current_cost - candidate.cost) / current_cost;
        if savings <= self.config.margin {
            return false;
        }
        match (candidate.trailing_cost, current_trailing) {
            (Some(candidate_trailing), Some(current_trailing)) => candidate_trailing < current_trailing,
            _ => true,
        }
    }
}
