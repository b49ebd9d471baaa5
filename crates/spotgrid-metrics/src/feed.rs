//! The metrics feed consumed by the control loop.

use std::future::Future;

use spotgrid_state::{MetricsWindow, OfferingKey, PriceQuote, PricingSnapshot};

/// Source of utilization samples and instance prices.
///
/// Implementations must be cheap to query once per deployment per tick.
pub trait MetricsFeed: Send + Sync {
    /// Samples for `deployment_id` taken within `window_secs` of `now`, oldest first.
    fn get_window(
        &self,
        deployment_id: &str,
        window_secs: u64,
        now: u64,
    ) -> impl Future<Output = MetricsWindow> + Send;

    /// Current price of one offering, if it is known.
    fn get_pricing(&self, key: &OfferingKey) -> impl Future<Output = Option<PriceQuote>> + Send;

    /// Every known offering, frozen at `now`.
    fn pricing_snapshot(&self, now: u64) -> impl Future<Output = PricingSnapshot> + Send;
}
