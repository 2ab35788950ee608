//! Error types for Armada

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArmadaError>;

#[derive(Error, Debug)]
pub enum ArmadaError {
    #[error("Failed to parse job definition: {reason}")]
    Parse { reason: String },

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Duplicate agent id: {agent_id}")]
    DuplicateAgentId { agent_id: String },

    #[error("Unknown agent '{agent_id}' referenced by topology field '{field}'")]
    UnknownAgentReference { agent_id: String, field: String },

    #[error("Module '{module}' for agent '{agent_id}' cannot be resolved")]
    ModuleNotFound { agent_id: String, module: String },

    #[error("Agent '{agent_id}' has no config.port")]
    MissingPort { agent_id: String },

    #[error("Agent '{agent_id}' has an invalid config.port: {value}")]
    InvalidPort { agent_id: String, value: String },

    #[error("Port conflict on {host}:{port}: agents '{first}' and '{second}'")]
    PortConflict {
        host: String,
        port: u16,
        first: String,
        second: String,
    },

    #[error("Cycle detected in DAG topology: no valid deployment order exists")]
    CycleDetected,

    #[error("Agent '{agent_id}' failed to become healthy after {elapsed_secs:.1}s: {last_error}")]
    HealthTimeout {
        agent_id: String,
        elapsed_secs: f64,
        last_error: String,
    },

    #[error("Runner failed for agent '{agent_id}': {reason}")]
    Runner { agent_id: String, reason: String },

    #[error("Deployment target '{target}' is not supported by this runner (agent '{agent_id}')")]
    UnsupportedTarget { agent_id: String, target: String },

    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl ArmadaError {
    /// Errors raised while loading a job, before any agent is started.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ArmadaError::Parse { .. }
                | ArmadaError::DuplicateAgentId { .. }
                | ArmadaError::UnknownAgentReference { .. }
                | ArmadaError::ModuleNotFound { .. }
                | ArmadaError::MissingPort { .. }
                | ArmadaError::InvalidPort { .. }
                | ArmadaError::PortConflict { .. }
        )
    }
}
