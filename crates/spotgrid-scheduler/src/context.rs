//! Per-tick frozen inputs.

use std::borrow::Cow;
use std::collections::HashMap;

use spotgrid_metrics::MetricsFeed;
use spotgrid_state::{DeploymentId, MetricsWindow, PricingSnapshot};

/// Everything the decision components read during one tick.
///
/// Built once at the start of the tick and never mutated, so every
/// deployment in the tick is judged against the same prices and clock.
#[derive(Debug, Clone, Default)]
pub struct TickContext {
    pub now: u64,
    pub pricing: PricingSnapshot,
    windows: HashMap<DeploymentId, MetricsWindow>,
}

impl TickContext {
    pub fn new(now: u64, pricing: PricingSnapshot) -> Self {
        Self {
            now,
            pricing,
            windows: HashMap::new(),
        }
    }

    /// Add (or replace) the metrics window of one deployment.
    pub fn with_window(mut self, window: MetricsWindow) -> Self {
        self.windows.insert(window.deployment_id.clone(), window);
        self
    }

    /// The window for a deployment, empty if none was captured.
    pub fn window(&self, deployment_id: &str) -> Cow<'_, MetricsWindow> {
        match self.windows.get(deployment_id) {
            Some(window) => Cow::Borrowed(window),
            None => Cow::Owned(MetricsWindow::empty(deployment_id)),
        }
    }

    /// Capture prices and the windows of the given deployments from a feed.
    pub async fn capture<F, I>(feed: &F, deployment_ids: I, window_secs: u64, now: u64) -> Self
    where
        F: MetricsFeed,
        I: IntoIterator<Item = DeploymentId>,
    {
        let mut ctx = Self::new(now, feed.pricing_snapshot(now).await);
        for id in deployment_ids {
            let window = feed.get_window(&id, window_secs, now).await;
            ctx.windows.insert(id, window);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgrid_metrics::MetricsCollector;
    use spotgrid_state::MetricsSample;

    #[test]
    fn missing_window_is_empty() {
        let ctx = TickContext::new(10, PricingSnapshot::default());
        let window = ctx.window("nope");
        assert_eq!(window.deployment_id, "nope");
        assert!(window.samples.is_empty());
    }

    #[tokio::test]
    async fn capture_reads_the_feed() {
        let collector = MetricsCollector::default();
        collector
            .record_sample(
                "d1",
                MetricsSample {
                    at: 95,
                    request_rate: 1.0,
                    latency_p50_ms: 1.0,
                    latency_p95_ms: 2.0,
                    error_rate: 0.0,
                    cpu_util: 0.4,
                    mem_util: 0.2,
                },
            )
            .await;

        let ctx = TickContext::capture(&collector, vec!["d1".to_string(), "d2".to_string()], 60, 100).await;
        assert_eq!(ctx.now, 100);
        assert_eq!(ctx.pricing.taken_at, 100);
        assert_eq!(ctx.window("d1").samples.len(), 1);
        assert!(ctx.window("d2").samples.is_empty());
    }
}
