//! spotgridd.toml configuration.
//!
//! ```toml
//! [controller]
//! tick_interval = "30s"
//!
//! [controller.arbitrage]
//! margin = 0.2
//!
//! [[offerings]]
//! key = { provider = "aws", region = "us-east-1", instance_class = "m5.xlarge" }
//! cpu_shares = 4000
//! memory_bytes = 17179869184
//! price = { on_demand = 0.192, spot = 0.072 }
//!
//! [[deployments]]
//! id = "default/chat"
//! ...
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use spotgrid_scheduler::ControllerConfig;
use spotgrid_state::{DeploymentRequest, InstanceOffering};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub controller: ControllerConfig,
    /// Price catalog. The built-in catalog is used when empty.
    pub offerings: Vec<InstanceOffering>,
    /// Deployments proposed at startup unless they already exist.
    pub deployments: Vec<DeploymentRequest>,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: DaemonConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path`, or use the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotgrid_state::BackendKind;

    const SAMPLE: &str = r#"
[controller]
tick_interval = "15s"

[controller.retry]
budget = 4

[[offerings]]
key = { provider = "aws", region = "us-east-1", instance_class = "m5.xlarge" }
cpu_shares = 4000
memory_bytes = 17179869184
price = { on_demand = 0.192, spot = 0.072 }

[[deployments]]
id = "default/chat"
model_ref = "models/llama:8b"
backend_kind = "orchestrated_cluster"
preferred_provider = "aws"
resources = { cpu_shares = 2000, memory_bytes = 4294967296, timeout_secs = 30 }
scaling = { min_instances = 0, max_instances = 4, target_utilization = 0.7 }
cost = { allow_spot = true, hibernation_enabled = true, idle_timeout_secs = 1800, allow_multi_cloud = false }
"#;

    #[test]
    fn parse_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spotgridd.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.controller.tick_interval_secs, 15);
        assert_eq!(config.controller.retry.budget, 4);
        assert_eq!(config.controller.ack_timeout_secs, 5);

        assert_eq!(config.offerings.len(), 1);
        let offering = &config.offerings[0];
        assert_eq!(offering.key.instance_class, "m5.xlarge");
        assert_eq!(offering.price.spot, Some(0.072));
        assert!(offering.accelerator.is_none());
        assert!(offering.price.trailing_on_demand.is_none());

        let request = &config.deployments[0];
        assert_eq!(request.backend_kind, BackendKind::OrchestratedCluster);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn defaults_round_trip() {
        let config = DaemonConfig::load(None).unwrap();
        assert!(config.offerings.is_empty());
        let text = config.to_toml_string().unwrap();
        let back: DaemonConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
