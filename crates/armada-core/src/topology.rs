//! Topology types

use crate::agent::AgentId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// How the agents of a job are wired together, keyed on `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TopologyConfig {
    HubSpoke {
        hub: AgentId,
        spokes: Vec<AgentId>,
    },
    Pipeline {
        stages: Vec<AgentId>,
    },
    Dag {
        connections: Vec<DagConnection>,
    },
    Mesh {
        agents: Vec<AgentId>,
    },
    Hierarchical {
        root: AgentId,
        #[serde(default)]
        levels: Vec<HierarchyLevel>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagConnection {
    pub from: AgentId,
    pub to: Targets,
}

/// `to` accepts a single id or a list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    One(AgentId),
    Many(Vec<AgentId>),
}

impl Targets {
    pub fn as_slice(&self) -> &[AgentId] {
        match self {
            Targets::One(id) => std::slice::from_ref(id),
            Targets::Many(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLevel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<AgentId>,
    #[serde(default)]
    pub children: Vec<AgentId>,
}

impl TopologyConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyConfig::HubSpoke { .. } => "hub-spoke",
            TopologyConfig::Pipeline { .. } => "pipeline",
            TopologyConfig::Dag { .. } => "dag",
            TopologyConfig::Mesh { .. } => "mesh",
            TopologyConfig::Hierarchical { .. } => "hierarchical",
        }
    }

    /// Every agent reference in the topology, paired with the field it came from.
    pub fn references(&self) -> Vec<(&'static str, &AgentId)> {
        let mut refs = Vec::new();
        match self {
            TopologyConfig::HubSpoke { hub, spokes } => {
                refs.push(("hub", hub));
                refs.extend(spokes.iter().map(|id| ("spokes", id)));
            }
            TopologyConfig::Pipeline { stages } => {
                refs.extend(stages.iter().map(|id| ("stages", id)));
            }
            TopologyConfig::Dag { connections } => {
                for connection in connections {
                    refs.push(("connections.from", &connection.from));
                    refs.extend(connection.to.as_slice().iter().map(|id| ("connections.to", id)));
                }
            }
            TopologyConfig::Mesh { agents } => {
                refs.extend(agents.iter().map(|id| ("agents", id)));
            }
            TopologyConfig::Hierarchical { root, levels } => {
                refs.push(("root", root));
                for level in levels {
                    if let Some(parent) = &level.parent {
                        refs.push(("levels.parent", parent));
                    }
                    refs.extend(level.children.iter().map(|id| ("levels.children", id)));
                }
            }
        }
        refs
    }

    /// Agents that get a deployment stage. In a hierarchy only the root and
    /// level children are scheduled; a level parent outside that tree is not.
    pub fn scheduled_agents(&self) -> IndexSet<&AgentId> {
        match self {
            TopologyConfig::Hierarchical { root, levels } => std::iter::once(root)
                .chain(levels.iter().flat_map(|level| level.children.iter()))
                .collect(),
            _ => self.references().into_iter().map(|(_, id)| id).collect(),
        }
    }
}
