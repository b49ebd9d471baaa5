//! Metrics-window and pricing-snapshot types shared by the decision components.
//!
//! Both are produced by the metrics feed once per tick and handed to the
//! autoscaler, hibernation manager, and arbitrage engine as frozen values.

use serde::{Deserialize, Serialize};

use crate::types::{Accelerator, DeploymentId, Placement};

// ── Metrics ───────────────────────────────────────────────────────

/// One metrics sample for a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    /// Unix timestamp (seconds) at the end of the sample interval.
    pub at: u64,
    /// Requests per second.
    pub request_rate: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    /// Error rate (0.0–1.0).
    pub error_rate: f64,
    /// CPU utilization (0.0–1.0) averaged across instances.
    pub cpu_util: f64,
    /// Memory utilization (0.0–1.0) averaged across instances.
    pub mem_util: f64,
}

impl MetricsSample {
    /// The binding utilization: whichever of CPU and memory is higher.
    pub fn utilization(&self) -> f64 {
        self.cpu_util.max(self.mem_util)
    }
}

/// Recent samples for one deployment, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsWindow {
    pub deployment_id: DeploymentId,
    pub samples: Vec<MetricsSample>,
}

impl MetricsWindow {
    pub fn empty(deployment_id: &str) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            samples: Vec::new(),
        }
    }

    pub fn latest(&self) -> Option<&MetricsSample> {
        self.samples.last()
    }

    /// Timestamp of the newest sample that saw any traffic.
    pub fn last_traffic_at(&self) -> Option<u64> {
        self.samples
            .iter()
            .rev()
            .find(|s| s.request_rate > 0.0)
            .map(|s| s.at)
    }

    /// The newest `n` samples, oldest first.
    pub fn tail(&self, n: usize) -> &[MetricsSample] {
        let start = self.samples.len().saturating_sub(n);
        &self.samples[start..]
    }
}

// ── Pricing ───────────────────────────────────────────────────────

/// Identifies an instance class offered by a provider in a region.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferingKey {
    pub provider: String,
    pub region: String,
    pub instance_class: String,
}

impl OfferingKey {
    pub fn new(provider: &str, region: &str, instance_class: &str) -> Self {
        Self {
            provider: provider.to_string(),
            region: region.to_string(),
            instance_class: instance_class.to_string(),
        }
    }

    /// The placement this offering yields, on spot or on-demand capacity.
    pub fn placement(&self, spot: bool) -> Placement {
        Placement {
            provider: self.provider.clone(),
            region: self.region.clone(),
            instance_class: self.instance_class.clone(),
            spot,
        }
    }
}

impl std::fmt::Display for OfferingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.region, self.instance_class)
    }
}

impl Placement {
    pub fn offering_key(&self) -> OfferingKey {
        OfferingKey::new(&self.provider, &self.region, &self.instance_class)
    }
}

/// Hourly prices for one instance of an offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub on_demand: f64,
    /// Absent when the class has no spot market.
    pub spot: Option<f64>,
    #[serde(default)]
    pub trailing_on_demand: Option<f64>,
    #[serde(default)]
    pub trailing_spot: Option<f64>,
}

/// An instance class with its per-instance capacity and price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOffering {
    pub key: OfferingKey,
    /// CPU capacity in millicores.
    pub cpu_shares: u32,
    pub memory_bytes: u64,
    pub accelerator: Option<Accelerator>,
    pub price: PriceQuote,
}

/// Frozen view of every offering's price for one tick.
///
/// Offerings are kept sorted by key so iteration order, and therefore every
/// decision derived from it, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub taken_at: u64,
    offerings: Vec<InstanceOffering>,
}

impl PricingSnapshot {
    pub fn new(taken_at: u64, mut offerings: Vec<InstanceOffering>) -> Self {
        offerings.sort_by(|a, b| a.key.cmp(&b.key));
        offerings.dedup_by(|a, b| a.key == b.key);
        Self {
            taken_at,
            offerings,
        }
    }

    pub fn get(&self, key: &OfferingKey) -> Option<&InstanceOffering> {
        self.offerings
            .binary_search_by(|o| o.key.cmp(key))
            .ok()
            .map(|i| &self.offerings[i])
    }

    pub fn offerings(&self) -> &[InstanceOffering] {
        &self.offerings
    }

    pub fn is_empty(&self) -> bool {
        self.offerings.is_empty()
    }
}
