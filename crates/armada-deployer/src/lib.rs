//! # Armada Deployer
//!
//! Starts the agents of a resolved job stage by stage, gating each stage on
//! health checks, and keeps watching them afterwards.

pub use armada_core;

mod deployer;
mod monitor;
mod runner;

pub use deployer::{AgentProcess, DeployedJob, Deployer, MIN_POLL_INTERVAL};
pub use monitor::{AgentHealthReport, Monitor};
pub use runner::{
    handoff_environment, AgentRunner, ContainerRunner, LocalProcessRunner, ProcessHandle,
    RemoteRunner, TargetRunner, TERMINATE_TIMEOUT,
};

// Re-export core types for convenience
pub use armada_core::{ArmadaError, DeploymentPlan, JobDefinition, Result};
pub use armada_health::{HealthProbe, HealthStatus};
