//! # Armada Core
//!
//! Core types for Armada, a topology-aware deployer for fleets of
//! independently running agent services.
//!
//! - [`JobLoader`] parses and validates a job description.
//! - [`TopologyResolver`] turns a job into a staged [`DeploymentPlan`].
//!
//! Nothing in this crate performs network I/O.

pub mod agent;
pub mod error;
pub mod job;
pub mod loader;
pub mod plan;
pub mod resolver;
pub mod topology;

pub use agent::{AgentConfig, AgentDeployment, AgentId, ConfigMap, DeploymentTarget};
pub use error::{ArmadaError, Result};
pub use job::{DeploymentConfig, DeploymentStrategy, JobDefinition, JobMetadata};
pub use loader::{JobLoader, ModuleResolver, PathModuleResolver};
pub use plan::DeploymentPlan;
pub use resolver::{resolve, TopologyResolver};
pub use topology::{DagConnection, HierarchyLevel, Targets, TopologyConfig};

/// Current Armada version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Armada build information for telemetry and debugging
pub const BUILD_INFO: &str = concat!(
    "Armada ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Standard API endpoints for Armada services
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const INFO: &str = "/info";
    pub const AGENTS: &str = "/agents";
    pub const AGENTS_REGISTER: &str = "/agents/register";
    pub const AGENTS_SEARCH: &str = "/agents/search";
    pub const AGENT: &str = "/agents/{id}";
    pub const AGENT_HEARTBEAT: &str = "/agents/{id}/heartbeat";
}

/// Environment handed to every launched agent process.
pub mod handoff {
    /// Comma-separated base URLs of the peers the agent should call.
    pub const CONNECTED_AGENTS: &str = "CONNECTED_AGENTS";
    pub const AGENT_ID: &str = "ARMADA_AGENT_ID";
    pub const AGENT_TYPE: &str = "ARMADA_AGENT_TYPE";
    /// JSON encoding of the agent's `config` map.
    pub const AGENT_CONFIG: &str = "ARMADA_AGENT_CONFIG";
    pub const PORT: &str = "PORT";
    pub const REGISTRY_URL: &str = "ARMADA_REGISTRY_URL";

    pub fn join_urls(urls: &[String]) -> String {
        urls.join(",")
    }

    pub fn split_urls(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }
}
