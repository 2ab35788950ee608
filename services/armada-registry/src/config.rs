//! Registry configuration, read from flags or `ARMADA_REGISTRY_*` variables.

use crate::error::Result;
use crate::registry::{HealthPolicy, DEFAULT_REMOVAL_THRESHOLD, DEFAULT_UNHEALTHY_THRESHOLD};
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Address to bind
    #[arg(long, env = "ARMADA_REGISTRY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "ARMADA_REGISTRY_PORT", default_value_t = 8500)]
    pub port: u16,

    /// Seconds between health sweeps
    #[arg(long, env = "ARMADA_REGISTRY_CHECK_INTERVAL", default_value_t = 30)]
    pub check_interval: u64,

    /// Per-probe timeout in seconds
    #[arg(long, env = "ARMADA_REGISTRY_CHECK_TIMEOUT", default_value_t = 5)]
    pub check_timeout: u64,

    /// Consecutive failures before an agent is marked unhealthy
    #[arg(long, env = "ARMADA_REGISTRY_UNHEALTHY_THRESHOLD", default_value_t = DEFAULT_UNHEALTHY_THRESHOLD)]
    pub unhealthy_threshold: u32,

    /// Consecutive failures before an agent is removed
    #[arg(long, env = "ARMADA_REGISTRY_REMOVAL_THRESHOLD", default_value_t = DEFAULT_REMOVAL_THRESHOLD)]
    pub removal_threshold: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8500,
            check_interval: 30,
            check_timeout: 5,
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
            removal_threshold: DEFAULT_REMOVAL_THRESHOLD,
        }
    }
}

impl RegistryConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.max(1))
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout.max(1))
    }

    pub fn policy(&self) -> Result<HealthPolicy> {
        HealthPolicy::new(self.unhealthy_threshold, self.removal_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: RegistryConfig,
    }

    #[test]
    fn test_defaults_match_flag_defaults() {
        let cli = Cli::parse_from(["armada-registry"]);
        assert_eq!(cli.config, RegistryConfig::default());
        assert_eq!(cli.config.bind_addr(), "0.0.0.0:8500");
        assert_eq!(cli.config.policy().unwrap(), HealthPolicy::default());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let cli = Cli::parse_from([
            "armada-registry",
            "--unhealthy-threshold",
            "5",
            "--removal-threshold",
            "2",
        ]);
        assert!(cli.config.policy().is_err());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = RegistryConfig {
            check_interval: 0,
            ..RegistryConfig::default()
        };
        assert_eq!(config.check_interval(), Duration::from_secs(1));
    }
}
