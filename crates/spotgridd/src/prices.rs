//! Price refresh file, re-read before every tick.
//!
//! ```toml
//! [[prices]]
//! key = { provider = "aws", region = "us-east-1", instance_class = "m5.xlarge" }
//! on_demand = 0.192
//! spot = 0.061
//! ```
//!
//! Each entry becomes a price observation of a registered offering, which
//! also feeds its trailing average. Unknown offerings are skipped.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, warn};

use spotgrid_metrics::MetricsCollector;
use spotgrid_state::OfferingKey;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceUpdate {
    pub key: OfferingKey,
    pub on_demand: f64,
    #[serde(default)]
    pub spot: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PriceFile {
    pub prices: Vec<PriceUpdate>,
}

impl PriceFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Record every update with the collector. Returns how many were applied.
pub async fn apply(collector: &MetricsCollector, updates: &[PriceUpdate]) -> usize {
    let mut applied = 0;
    for update in updates {
        if collector
            .record_price(&update.key, update.on_demand, update.spot)
            .await
        {
            applied += 1;
        } else {
            warn!(offering = %update.key, "price for unknown offering ignored");
        }
    }
    debug!(applied, total = updates.len(), "prices refreshed");
    applied
}

/// Re-read `path` and apply it.
pub async fn refresh(collector: &MetricsCollector, path: &Path) -> anyhow::Result<usize> {
    let file = PriceFile::from_file(path)?;
    Ok(apply(collector, &file.prices).await)
}
