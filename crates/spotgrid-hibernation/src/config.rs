//! Hibernation tuning.

use serde::{Deserialize, Serialize};
use spotgrid_state::duration::serde_secs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HibernationConfig {
    /// Global switch. When off, no deployment is suspended; hibernated ones still wake.
    pub enabled: bool,
    /// Back-off hint returned to callers waiting on a resume.
    #[serde(rename = "wake_retry_after", with = "serde_secs")]
    pub wake_retry_after_secs: u64,
}

impl Default for HibernationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_retry_after_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_toml() {
        let config: HibernationConfig = toml::from_str(
            r#"
enabled = false
wake_retry_after = "10s"
"#,
        )
        .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.wake_retry_after_secs, 10);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config: HibernationConfig = toml::from_str("").unwrap();
        assert_eq!(config, HibernationConfig::default());
    }
}
