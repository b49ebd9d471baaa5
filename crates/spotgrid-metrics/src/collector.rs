//! Metrics collector — in-memory samples and price catalog.
//!
//! Samples are kept per deployment in a bounded ring buffer. Prices are kept
//! per offering along with a short history from which the trailing price is
//! derived.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use spotgrid_state::{InstanceOffering, MetricsSample, MetricsWindow, OfferingKey, PriceQuote, PricingSnapshot};

use crate::feed::MetricsFeed;

/// Default number of samples retained per deployment.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 120;

/// Number of price observations averaged into the trailing price.
pub const PRICE_HISTORY: usize = 12;

/// Current price plus recent history for one offering.
struct PricedOffering {
    offering: InstanceOffering,
    on_demand_history: VecDeque<f64>,
    spot_history: VecDeque<f64>,
}

impl PricedOffering {
    fn new(offering: InstanceOffering) -> Self {
        Self {
            offering,
            on_demand_history: VecDeque::with_capacity(PRICE_HISTORY),
            spot_history: VecDeque::with_capacity(PRICE_HISTORY),
        }
    }

    fn observe(&mut self, on_demand: f64, spot: Option<f64>) {
        push_bounded(&mut self.on_demand_history, on_demand, PRICE_HISTORY);
        if let Some(spot) = spot {
            push_bounded(&mut self.spot_history, spot, PRICE_HISTORY);
        }
        self.offering.price = PriceQuote {
            on_demand,
            spot,
            trailing_on_demand: mean(&self.on_demand_history),
            trailing_spot: spot.and(mean(&self.spot_history)),
        };
    }
}

/// Collects utilization samples and prices, and serves them as a `MetricsFeed`.
#[derive(Clone)]
pub struct MetricsCollector {
    /// deployment_id → samples, oldest first.
    samples: Arc<RwLock<HashMap<String, VecDeque<MetricsSample>>>>,
    /// Known offerings, ordered by key.
    offerings: Arc<RwLock<BTreeMap<OfferingKey, PricedOffering>>>,
    capacity: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}

impl MetricsCollector {
    /// Create a collector keeping at most `capacity` samples per deployment.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(RwLock::new(HashMap::new())),
            offerings: Arc::new(RwLock::new(BTreeMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample for a deployment. Out-of-order samples are dropped.
    pub async fn record_sample(&self, deployment_id: &str, sample: MetricsSample) {
        let mut samples = self.samples.write().await;
        let buf = samples.entry(deployment_id.to_string()).or_default();
        if let Some(last) = buf.back()
            && sample.at < last.at
        {
            debug!(%deployment_id, at = sample.at, last = last.at, "dropping out-of-order sample");
            return;
        }
        push_bounded(buf, sample, self.capacity);
    }

    /// Forget all samples of a deployment.
    pub async fn forget(&self, deployment_id: &str) {
        self.samples.write().await.remove(deployment_id);
    }

    /// Register or replace an offering with its current price.
    ///
    /// The price history restarts from the given quote. Trailing prices
    /// already present on the quote are kept.
    pub async fn set_offering(&self, offering: InstanceOffering) {
        let mut offerings = self.offerings.write().await;
        let key = offering.key.clone();
        let mut priced = PricedOffering::new(offering);
        priced
            .on_demand_history
            .push_back(priced.offering.price.on_demand);
        if let Some(spot) = priced.offering.price.spot {
            priced.spot_history.push_back(spot);
        }
        debug!(offering = %key, "offering registered");
        offerings.insert(key, priced);
    }

    /// Record a new price observation for a known offering.
    ///
    /// Returns `false` if the offering was never registered.
    pub async fn record_price(&self, key: &OfferingKey, on_demand: f64, spot: Option<f64>) -> bool {
        let mut offerings = self.offerings.write().await;
        match offerings.get_mut(key) {
            Some(priced) => {
                priced.observe(on_demand, spot);
                true
            }
            None => false,
        }
    }

    /// Deployment ids with at least one sample.
    pub async fn tracked_deployments(&self) -> Vec<String> {
        let samples = self.samples.read().await;
        let mut ids: Vec<String> = samples.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl MetricsFeed for MetricsCollector {
    async fn get_window(&self, deployment_id: &str, window_secs: u64, now: u64) -> MetricsWindow {
        let samples = self.samples.read().await;
        let since = now.saturating_sub(window_secs);
        let samples = samples
            .get(deployment_id)
            .map(|buf| {
                buf.iter()
                    .filter(|s| s.at >= since && s.at <= now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        MetricsWindow {
            deployment_id: deployment_id.to_string(),
            samples,
        }
    }

    async fn get_pricing(&self, key: &OfferingKey) -> Option<PriceQuote> {
        let offerings = self.offerings.read().await;
        offerings.get(key).map(|p| p.offering.price.clone())
    }

    async fn pricing_snapshot(&self, now: u64) -> PricingSnapshot {
        let offerings = self.offerings.read().await;
        PricingSnapshot::new(now, offerings.values().map(|p| p.offering.clone()).collect())
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, value: T, capacity: usize) {
    if buf.len() == capacity {
        buf.pop_front();
    }
    buf.push_back(value);
}

fn mean(values: &VecDeque<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
