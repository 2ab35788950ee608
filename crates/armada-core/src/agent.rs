//! Agent types

use crate::error::{ArmadaError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type AgentId = String;

/// Free-form, order-preserving key/value map used for agent config and metadata.
pub type ConfigMap = IndexMap<String, Value>;

/// Where an agent process runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum DeploymentTarget {
    Localhost,
    Remote {
        host: String,
    },
    Container {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_name: Option<String>,
    },
}

impl DeploymentTarget {
    pub fn name(&self) -> &'static str {
        match self {
            DeploymentTarget::Localhost => "localhost",
            DeploymentTarget::Remote { .. } => "remote",
            DeploymentTarget::Container { .. } => "container",
        }
    }

    /// Whether the agent must declare `config.port`.
    pub fn requires_port(&self) -> bool {
        !matches!(self, DeploymentTarget::Container { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDeployment {
    #[serde(flatten)]
    pub target: DeploymentTarget,
    /// Static overrides merged into the launched process environment.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
}

impl Default for AgentDeployment {
    fn default() -> Self {
        Self {
            target: DeploymentTarget::Localhost,
            environment: IndexMap::new(),
        }
    }
}

/// One deployable unit of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Launch command (executable name or path) for local targets.
    pub module: String,
    /// Extra arguments passed to `module` when launched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub deployment: AgentDeployment,
}

impl AgentConfig {
    pub fn target(&self) -> &DeploymentTarget {
        &self.deployment.target
    }

    /// Reads `config.port`, returning `None` when it is absent.
    pub fn port(&self) -> Result<Option<u16>> {
        let Some(value) = self.config.get("port") else {
            return Ok(None);
        };

        value
            .as_u64()
            .filter(|port| (1..=u64::from(u16::MAX)).contains(port))
            .map(|port| Some(port as u16))
            .ok_or_else(|| ArmadaError::InvalidPort {
                agent_id: self.id.clone(),
                value: value.to_string(),
            })
    }

    /// Like [`AgentConfig::port`], but a missing port is an error.
    pub fn required_port(&self) -> Result<u16> {
        self.port()?.ok_or_else(|| ArmadaError::MissingPort {
            agent_id: self.id.clone(),
        })
    }

    /// Host the agent is reachable on.
    pub fn host(&self) -> &str {
        match &self.deployment.target {
            DeploymentTarget::Localhost => "localhost",
            DeploymentTarget::Remote { host } => host,
            DeploymentTarget::Container { container_name } => {
                container_name.as_deref().unwrap_or(&self.id)
            }
        }
    }

    /// Base URL, `http://<host>:<port>`.
    pub fn base_url(&self) -> Result<String> {
        Ok(format!("http://{}:{}", self.host(), self.required_port()?))
    }
}
