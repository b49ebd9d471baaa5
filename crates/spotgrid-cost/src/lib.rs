//! SpotGrid cost model.
//!
//! Pure functions over a frozen `PricingSnapshot`. Nothing here performs I/O
//! or keeps state, so the same inputs always yield the same estimate.
//!
//! # Components
//!
//! - **`model`** — Per-replica cost, packing factor, spend and savings estimates
//! - **`candidates`** — Ranking of every offering that fits a resource shape

pub mod candidates;
pub mod model;

pub use candidates::{Candidate, cheapest, rank_offerings};
pub use model::{
    estimate, estimate_trailing, hibernation_savings, hourly_spend, instance_price,
    replicas_per_instance,
};
