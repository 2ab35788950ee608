use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Removal threshold ({removal}) must be greater than unhealthy threshold ({unhealthy}), which must be at least 1")]
    InvalidThresholds { unhealthy: u32, removal: u32 },

    #[error("Invalid registration: {reason}")]
    InvalidRegistration { reason: String },

    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry server error: {0}")]
    Server(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
