//! Per-replica cost estimation.
//!
//! An offering's hourly price buys one instance. Replicas of a deployment are
//! packed onto that instance as tightly as its CPU, memory and accelerator
//! capacity allow, and the per-replica cost is the instance price divided by
//! the packing factor.

use spotgrid_state::{Deployment, InstanceOffering, OfferingKey, PricingSnapshot, ResourceRequirements};

/// How many replicas of `shape` fit on one instance of `offering`.
///
/// Returns 0 when the shape does not fit at all, including when it needs an
/// accelerator the offering lacks or of a different kind.
pub fn replicas_per_instance(shape: &ResourceRequirements, offering: &InstanceOffering) -> u32 {
    let cpu_fit = if shape.cpu_shares > 0 {
        u64::from(offering.cpu_shares / shape.cpu_shares)
    } else {
        u64::MAX
    };
    let mem_fit = if shape.memory_bytes > 0 {
        offering.memory_bytes / shape.memory_bytes
    } else {
        u64::MAX
    };
    let accel_fit = match (&shape.accelerator, &offering.accelerator) {
        (None, _) => u64::MAX,
        (Some(want), Some(have)) if want.kind == have.kind && want.count > 0 => {
            u64::from(have.count / want.count)
        }
        (Some(_), _) => 0,
    };

    cpu_fit.min(mem_fit).min(accel_fit).min(u64::from(u32::MAX)) as u32
}

/// Hourly price of one instance and whether it is the spot price.
///
/// Spot is used when allowed and the offering has a spot market.
pub fn instance_price(offering: &InstanceOffering, spot_allowed: bool) -> (f64, bool) {
    match offering.price.spot {
        Some(spot) if spot_allowed => (spot, true),
        _ => (offering.price.on_demand, false),
    }
}

/// Estimated cost per replica-hour of running `shape` on `key`.
///
/// `None` when the offering is not in the snapshot or cannot hold a single
/// replica.
pub fn estimate(
    shape: &ResourceRequirements,
    key: &OfferingKey,
    snapshot: &PricingSnapshot,
    spot_allowed: bool,
) -> Option<f64> {
    let offering = snapshot.get(key)?;
    let packing = replicas_per_instance(shape, offering);
    if packing == 0 {
        return None;
    }
    let (price, _) = instance_price(offering, spot_allowed);
    Some(price / f64::from(packing))
}

/// Same as [`estimate`] but on trailing prices.
///
/// `None` also when the relevant trailing price is not published.
pub fn estimate_trailing(
    shape: &ResourceRequirements,
    key: &OfferingKey,
    snapshot: &PricingSnapshot,
    spot_allowed: bool,
) -> Option<f64> {
    let offering = snapshot.get(key)?;
    let packing = replicas_per_instance(shape, offering);
    if packing == 0 {
        return None;
    }
    let price = match offering.price.spot {
        Some(_) if spot_allowed => offering.price.trailing_spot?,
        _ => offering.price.trailing_on_demand?,
    };
    Some(price / f64::from(packing))
}

/// Projected hourly spend of a deployment at its current placement and size.
///
/// Zero when unplaced, scaled to zero, or priced outside the snapshot.
pub fn hourly_spend(deployment: &Deployment, snapshot: &PricingSnapshot) -> f64 {
    let Some(placement) = &deployment.placement else {
        return 0.0;
    };
    estimate(
        &deployment.resources,
        &placement.offering_key(),
        snapshot,
        placement.spot,
    )
    .map(|per_replica| per_replica * f64::from(deployment.observed.current_instances))
    .unwrap_or(0.0)
}

/// Hourly spend avoided by suspending the deployment now.
pub fn hibernation_savings(deployment: &Deployment, snapshot: &PricingSnapshot) -> f64 {
    hourly_spend(deployment, snapshot)
}
