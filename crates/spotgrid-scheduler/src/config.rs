//! Controller configuration.
//!
//! Every policy constant of the control loop lives here. Durations are
//! written as strings (`"30s"`, `"5m"`) in TOML and held as seconds.

use serde::{Deserialize, Serialize};

use spotgrid_arbitrage::ArbitrageConfig;
use spotgrid_autoscale::AutoscaleConfig;
use spotgrid_hibernation::HibernationConfig;
use spotgrid_state::duration::serde_secs;

/// Top-level configuration of the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Interval between reconciliation ticks.
    #[serde(rename = "tick_interval", with = "serde_secs")]
    pub tick_interval_secs: u64,
    /// How long a submission waits for the executor's Ack or Reject.
    #[serde(rename = "ack_timeout", with = "serde_secs")]
    pub ack_timeout_secs: u64,
    /// How long an acknowledged action may stay without an outcome before it
    /// counts as failed. Migrations are bounded by their own deadline instead.
    #[serde(rename = "outcome_timeout", with = "serde_secs")]
    pub outcome_timeout_secs: u64,
    pub retry: RetryConfig,
    pub autoscale: AutoscaleConfig,
    pub hibernation: HibernationConfig,
    pub arbitrage: ArbitrageConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            ack_timeout_secs: 5,
            outcome_timeout_secs: 300,
            retry: RetryConfig::default(),
            autoscale: AutoscaleConfig::default(),
            hibernation: HibernationConfig::default(),
            arbitrage: ArbitrageConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_secs == 0 {
            return Err("tick_interval must be positive".to_string());
        }
        if self.ack_timeout_secs == 0 {
            return Err("ack_timeout must be positive".to_string());
        }
        if self.outcome_timeout_secs == 0 {
            return Err("outcome_timeout must be positive".to_string());
        }
        if self.retry.budget == 0 {
            return Err("retry.budget must be at least 1".to_string());
        }
        if !(0.0..1.0).contains(&self.arbitrage.margin) {
            return Err(format!(
                "arbitrage.margin {} is outside [0, 1)",
                self.arbitrage.margin
            ));
        }
        if self.arbitrage.debounce_ticks == 0 {
            return Err("arbitrage.debounce_ticks must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Bounded retries with exponential back-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per submission, and consecutive failures per provision or
    /// resize, before giving up.
    pub budget: u32,
    #[serde(rename = "backoff_base", with = "serde_secs")]
    pub backoff_base_secs: u64,
    #[serde(rename = "backoff_max", with = "serde_secs")]
    pub backoff_max_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: 3,
            backoff_base_secs: 2,
            backoff_max_secs: 60,
        }
    }
}

impl RetryConfig {
    /// Delay before the next attempt after `attempts` attempts so far.
    pub fn backoff_secs(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(31);
        self.backoff_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_max_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval_secs, 30);
        assert_eq!(config.arbitrage.margin, 0.15);
        assert_eq!(config.autoscale.scale_down_dwell_secs, 300);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_secs(1), 2);
        assert_eq!(retry.backoff_secs(2), 4);
        assert_eq!(retry.backoff_secs(3), 8);
        assert_eq!(retry.backoff_secs(10), 60);
        assert_eq!(retry.backoff_secs(1000), 60);
    }

    #[test]
    fn parse_nested_toml() {
        let config: ControllerConfig = toml::from_str(
            r#"
tick_interval = "15s"
outcome_timeout = "2m"

[retry]
budget = 5

[autoscale]
scale_down_dwell = "10m"
trend_samples = 4

[arbitrage]
margin = 0.2
debounce_ticks = 3
"#,
        )
        .unwrap();
        assert_eq!(config.tick_interval_secs, 15);
        assert_eq!(config.ack_timeout_secs, 5);
        assert_eq!(config.outcome_timeout_secs, 120);
        assert_eq!(config.retry.budget, 5);
        assert_eq!(config.retry.backoff_base_secs, 2);
        assert_eq!(config.autoscale.scale_down_dwell_secs, 600);
        assert_eq!(config.autoscale.trend_samples, 4);
        assert_eq!(config.arbitrage.debounce_ticks, 3);
        assert_eq!(config.hibernation, HibernationConfig::default());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = ControllerConfig::default();
        config.retry.budget = 0;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.arbitrage.margin = 1.5;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.outcome_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn serializes_durations_as_strings() {
        let text = toml::to_string(&ControllerConfig::default()).unwrap();
        assert!(text.contains("tick_interval = \"30s\""));
        let back: ControllerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, ControllerConfig::default());
    }
}
