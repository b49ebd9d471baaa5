//! Ranking of placement candidates.
//!
//! Every offering in the snapshot that can hold at least one replica of the
//! shape becomes a candidate. Candidates are sorted cheapest first, with
//! ties broken by offering key and then on-demand before spot, so the ranking
//! is a total order and repeated evaluation of the same snapshot yields the
//! same winner.

use serde::Serialize;
use spotgrid_state::{Placement, PricingSnapshot, ResourceRequirements};

use crate::model::{estimate, estimate_trailing};

/// A scored placement option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub placement: Placement,
    /// Estimated cost per replica-hour.
    pub cost: f64,
    /// Same estimate on trailing prices, when published.
    pub trailing_cost: Option<f64>,
}

/// Rank all fitting offerings (cheapest first).
///
/// With `provider` set, only that provider's offerings are considered. With
/// `spot_allowed`, offerings that have a spot market are priced as spot.
pub fn rank_offerings(
    shape: &ResourceRequirements,
    snapshot: &PricingSnapshot,
    spot_allowed: bool,
    provider: Option<&str>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = snapshot
        .offerings()
        .iter()
        .filter(|o| provider.is_none_or(|p| o.key.provider == p))
        .filter_map(|o| {
            let cost = estimate(shape, &o.key, snapshot, spot_allowed)?;
            let spot = spot_allowed && o.price.spot.is_some();
            Some(Candidate {
                placement: o.key.placement(spot),
                cost,
                trailing_cost: estimate_trailing(shape, &o.key, snapshot, spot_allowed),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.cost
            .total_cmp(&b.cost)
            .then_with(|| a.placement.offering_key().cmp(&b.placement.offering_key()))
            .then_with(|| a.placement.spot.cmp(&b.placement.spot))
    });
    candidates
}

/// The cheapest fitting candidate, if any.
pub fn cheapest(
    shape: &ResourceRequirements,
    snapshot: &PricingSnapshot,
    spot_allowed: bool,
    provider: Option<&str>,
) -> Option<Candidate> {
    rank_offerings(shape, snapshot, spot_allowed, provider)
        .into_iter()
        .next()
}
