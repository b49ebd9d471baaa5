//! Prometheus text exposition format.
//!
//! Renders controller state into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::collections::BTreeMap;
use std::fmt::Write;

use spotgrid_cost::hourly_spend;
use spotgrid_state::{Deployment, DeploymentState, PricingSnapshot};

/// Render deployment gauges, action counters and projected spend.
///
/// `actions_emitted` maps action kind names (`"resize"`, `"migrate"`, ...) to
/// the number of actions of that kind emitted since startup.
pub fn render_prometheus(
    deployments: &[Deployment],
    actions_emitted: &BTreeMap<&'static str, u64>,
    pricing: &PricingSnapshot,
) -> String {
    let mut out = String::new();

    out.push_str("# HELP spotgrid_deployments Deployments by lifecycle state.\n");
    out.push_str("# TYPE spotgrid_deployments gauge\n");
    for state in DeploymentState::ALL {
        let count = deployments.iter().filter(|d| d.state == state).count();
        let _ = writeln!(out, "spotgrid_deployments{{state=\"{state}\"}} {count}");
    }

    out.push_str("# HELP spotgrid_actions_emitted_total Actions emitted by kind.\n");
    out.push_str("# TYPE spotgrid_actions_emitted_total counter\n");
    for (kind, count) in actions_emitted {
        let _ = writeln!(out, "spotgrid_actions_emitted_total{{kind=\"{kind}\"}} {count}");
    }

    out.push_str("# HELP spotgrid_instances Current serving instances.\n");
    out.push_str("# TYPE spotgrid_instances gauge\n");
    for d in deployments {
        let _ = writeln!(
            out,
            "spotgrid_instances{{deployment=\"{}\"}} {}",
            d.id, d.observed.current_instances
        );
    }

    out.push_str("# HELP spotgrid_hourly_spend Projected hourly spend at the current placement.\n");
    out.push_str("# TYPE spotgrid_hourly_spend gauge\n");
    let mut total = 0.0;
    for d in deployments {
        let spend = hourly_spend(d, pricing);
        total += spend;
        let provider = d.placement.as_ref().map(|p| p.provider.as_str()).unwrap_or("");
        let _ = writeln!(
            out,
            "spotgrid_hourly_spend{{deployment=\"{}\",provider=\"{provider}\"}} {spend:.4}",
            d.id
        );
    }

    out.push_str("# HELP spotgrid_hourly_spend_total Projected hourly spend across deployments.\n");
    out.push_str("# TYPE spotgrid_hourly_spend_total gauge\n");
    let _ = writeln!(out, "spotgrid_hourly_spend_total {total:.4}");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgrid_state::{
        BackendKind, CostPolicy, DeploymentRequest, InstanceOffering, OfferingKey, PriceQuote,
        ResourceRequirements, ScalingPolicy,
    };

    fn test_deployment(id: &str, state: DeploymentState, instances: u32) -> Deployment {
        let mut d = DeploymentRequest {
            id: id.to_string(),
            model_ref: "models/bert:1".to_string(),
            backend_kind: BackendKind::OrchestratedCluster,
            preferred_provider: None,
            resources: ResourceRequirements {
                cpu_shares: 2000,
                memory_bytes: 4 << 30,
                accelerator: None,
                timeout_secs: 30,
            },
            scaling: ScalingPolicy {
                min_instances: 0,
                max_instances: 8,
                target_utilization: 0.7,
            },
            cost: CostPolicy {
                allow_spot: false,
                hibernation_enabled: true,
                idle_timeout_secs: 1800,
                allow_multi_cloud: false,
            },
        }
        .into_deployment(0);
        d.state = state;
        d.placement = Some(OfferingKey::new("aws", "us-east-1", "m5.xlarge").placement(false));
        d.observed.current_instances = instances;
        d
    }

    fn pricing() -> PricingSnapshot {
        PricingSnapshot::new(
            0,
            vec![InstanceOffering {
                key: OfferingKey::new("aws", "us-east-1", "m5.xlarge"),
                cpu_shares: 4000,
                memory_bytes: 16 << 30,
                accelerator: None,
                price: PriceQuote {
                    on_demand: 0.2,
                    spot: None,
                    trailing_on_demand: None,
                    trailing_spot: None,
                },
            }],
        )
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&[], &BTreeMap::new(), &PricingSnapshot::default());
        assert!(output.contains("# TYPE spotgrid_deployments gauge"));
        assert!(output.contains("spotgrid_deployments{state=\"active\"} 0"));
        assert!(output.contains("spotgrid_hourly_spend_total 0.0000"));
    }

    #[test]
    fn render_counts_states_and_spend() {
        let deployments = vec![
            test_deployment("api", DeploymentState::Active, 4),
            test_deployment("batch", DeploymentState::Hibernated, 0),
        ];
        let mut actions = BTreeMap::new();
        actions.insert("resize", 3);
        actions.insert("suspend", 1);

        let output = render_prometheus(&deployments, &actions, &pricing());

        assert!(output.contains("spotgrid_deployments{state=\"active\"} 1"));
        assert!(output.contains("spotgrid_deployments{state=\"hibernated\"} 1"));
        assert!(output.contains("spotgrid_actions_emitted_total{kind=\"resize\"} 3"));
        assert!(output.contains("spotgrid_instances{deployment=\"api\"} 4"));
        assert!(output.contains("spotgrid_hourly_spend{deployment=\"api\",provider=\"aws\"} 0.4000"));
        assert!(output.contains("spotgrid_hourly_spend{deployment=\"batch\",provider=\"aws\"} 0.0000"));
        assert!(output.contains("spotgrid_hourly_spend_total 0.4000"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let deployments = vec![test_deployment("api", DeploymentState::Active, 1)];
        let output = render_prometheus(&deployments, &BTreeMap::new(), &pricing());

        // Every sample line is `name{labels} value` or `name value`.
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.rsplitn(2, ' ').collect();
            assert_eq!(parts.len(), 2, "line: {line}");
            assert!(parts[0].parse::<f64>().is_ok(), "value in: {line}");
        }
    }
}
