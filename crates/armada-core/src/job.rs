//! Job definition types

use crate::agent::AgentConfig;
use crate::topology::TopologyConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DEPLOY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStrategy {
    /// Stages start one after another; agents inside a stage start together.
    #[default]
    #[serde(rename = "sequential-by-stage", alias = "sequential")]
    SequentialByStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub strategy: DeploymentStrategy,
    /// Per-agent startup timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Delay between health polls during startup, in seconds.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_DEPLOY_TIMEOUT_SECS
}

fn default_health_check_interval() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL_SECS
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            strategy: DeploymentStrategy::default(),
            timeout: DEFAULT_DEPLOY_TIMEOUT_SECS,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
        }
    }
}

impl DeploymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }
}

/// A complete, declarative deployment description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDefinition {
    #[serde(rename = "job")]
    pub metadata: JobMetadata,
    pub agents: Vec<AgentConfig>,
    pub topology: TopologyConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl JobDefinition {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|agent| agent.id == id)
    }
}
