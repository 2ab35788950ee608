//! Deployment plan produced by the topology resolver

use crate::agent::AgentId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    /// Stage `i` must be fully healthy before stage `i + 1` starts.
    pub stages: Vec<Vec<AgentId>>,
    pub agent_urls: IndexMap<AgentId, String>,
    /// Peer URLs each agent is told to call.
    pub connections: IndexMap<AgentId, Vec<String>>,
}

impl DeploymentPlan {
    /// Index of the stage containing `agent_id`.
    pub fn stage_of(&self, agent_id: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.iter().any(|id| id == agent_id))
    }

    pub fn url(&self, agent_id: &str) -> Option<&str> {
        self.agent_urls.get(agent_id).map(String::as_str)
    }

    pub fn connections_for(&self, agent_id: &str) -> &[String] {
        self.connections
            .get(agent_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Agents in deployment order.
    pub fn agent_ids(&self) -> impl Iterator<Item = &AgentId> {
        self.stages.iter().flatten()
    }
}
