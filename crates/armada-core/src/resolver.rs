//! Topology resolver
//!
//! Turns a [`JobDefinition`] into a [`DeploymentPlan`]: the ordered stages
//! to start, each agent's base URL, and the peer URLs each agent is handed.
//! Resolution is a pure function of the job, so resolving the same job twice
//! yields identical plans.

use crate::agent::AgentId;
use crate::error::{ArmadaError, Result};
use crate::job::JobDefinition;
use crate::loader::validate_topology_references;
use crate::plan::DeploymentPlan;
use crate::topology::{DagConnection, HierarchyLevel, TopologyConfig};
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

type Stages = Vec<Vec<AgentId>>;
type Connections = IndexMap<AgentId, Vec<String>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct TopologyResolver;

impl TopologyResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, job: &JobDefinition) -> Result<DeploymentPlan> {
        validate_topology_references(job)?;

        let agent_urls = job
            .agents
            .iter()
            .map(|agent| Ok((agent.id.clone(), agent.base_url()?)))
            .collect::<Result<IndexMap<_, _>>>()?;
        let urls = UrlBook(&agent_urls);

        let (stages, connections) = match &job.topology {
            TopologyConfig::HubSpoke { hub, spokes } => hub_spoke(hub, spokes, &urls),
            TopologyConfig::Pipeline { stages } => pipeline(stages, &urls),
            TopologyConfig::Dag { connections } => dag(connections, &urls)?,
            TopologyConfig::Mesh { agents } => mesh(agents, &urls),
            TopologyConfig::Hierarchical { root, levels } => hierarchical(root, levels, &urls),
        };

        debug!(
            job = %job.metadata.name,
            topology = job.topology.kind(),
            stages = stages.len(),
            "Resolved deployment plan"
        );

        Ok(DeploymentPlan {
            stages,
            agent_urls,
            connections,
        })
    }
}

/// Shorthand for [`TopologyResolver::resolve`].
pub fn resolve(job: &JobDefinition) -> Result<DeploymentPlan> {
    TopologyResolver.resolve(job)
}

struct UrlBook<'a>(&'a IndexMap<AgentId, String>);

impl UrlBook<'_> {
    // References are validated before any lookup happens.
    fn url(&self, id: &str) -> String {
        self.0.get(id).cloned().unwrap_or_default()
    }
}

fn unique<'a>(ids: impl IntoIterator<Item = &'a AgentId>) -> Vec<AgentId> {
    ids.into_iter()
        .collect::<IndexSet<_>>()
        .into_iter()
        .cloned()
        .collect()
}

fn push_unique(list: &mut Vec<String>, url: String) {
    if !list.contains(&url) {
        list.push(url);
    }
}

fn hub_spoke(hub: &AgentId, spokes: &[AgentId], urls: &UrlBook) -> (Stages, Connections) {
    let spokes = unique(spokes.iter().filter(|id| *id != hub));

    let mut stages = Vec::new();
    if !spokes.is_empty() {
        stages.push(spokes.clone());
    }
    stages.push(vec![hub.clone()]);

    let mut connections = Connections::new();
    connections.insert(
        hub.clone(),
        spokes.iter().map(|spoke| urls.url(spoke)).collect(),
    );
    for spoke in spokes {
        connections.insert(spoke, Vec::new());
    }
    (stages, connections)
}

fn pipeline(order: &[AgentId], urls: &UrlBook) -> (Stages, Connections) {
    let order = unique(order);
    let stages = order.iter().map(|id| vec![id.clone()]).collect();

    let mut connections: Connections = order.iter().map(|id| (id.clone(), Vec::new())).collect();
    for pair in order.windows(2) {
        if let Some(list) = connections.get_mut(&pair[0]) {
            list.push(urls.url(&pair[1]));
        }
    }
    (stages, connections)
}

/// Level-by-level topological sort: each stage is every remaining node
/// whose predecessors have all been scheduled in earlier stages.
fn dag(edges: &[DagConnection], urls: &UrlBook) -> Result<(Stages, Connections)> {
    let mut predecessors: IndexMap<&AgentId, IndexSet<&AgentId>> = IndexMap::new();
    for edge in edges {
        predecessors.entry(&edge.from).or_default();
        for to in edge.to.as_slice() {
            predecessors.entry(to).or_default().insert(&edge.from);
        }
    }

    let mut scheduled: IndexSet<&AgentId> = IndexSet::new();
    let mut stages = Vec::new();
    while scheduled.len() < predecessors.len() {
        let ready: Vec<&AgentId> = predecessors
            .iter()
            .filter(|(node, preds)| {
                !scheduled.contains(*node) && preds.iter().all(|p| scheduled.contains(p))
            })
            .map(|(node, _)| *node)
            .collect();

        if ready.is_empty() {
            return Err(ArmadaError::CycleDetected);
        }
        scheduled.extend(ready.iter().copied());
        stages.push(ready.into_iter().cloned().collect());
    }

    let mut connections: Connections = predecessors
        .keys()
        .map(|id| ((*id).clone(), Vec::new()))
        .collect();
    for edge in edges {
        if let Some(list) = connections.get_mut(&edge.from) {
            for to in edge.to.as_slice() {
                push_unique(list, urls.url(to));
            }
        }
    }
    Ok((stages, connections))
}

fn mesh(agents: &[AgentId], urls: &UrlBook) -> (Stages, Connections) {
    let agents = unique(agents);

    let connections = agents
        .iter()
        .map(|id| {
            let peers = agents
                .iter()
                .filter(|peer| *peer != id)
                .map(|peer| urls.url(peer))
                .collect();
            (id.clone(), peers)
        })
        .collect();

    let stages = if agents.is_empty() {
        Vec::new()
    } else {
        vec![agents]
    };
    (stages, connections)
}

fn hierarchical(root: &AgentId, levels: &[HierarchyLevel], urls: &UrlBook) -> (Stages, Connections) {
    let mut scheduled: IndexSet<&AgentId> = IndexSet::from([root]);
    let mut stages = vec![vec![root.clone()]];
    let mut connections = Connections::new();
    connections.insert(root.clone(), Vec::new());

    for level in levels {
        let stage: Vec<AgentId> = level
            .children
            .iter()
            .filter(|child| scheduled.insert(*child))
            .cloned()
            .collect();
        if !stage.is_empty() {
            stages.push(stage);
        }

        for child in &level.children {
            connections.entry(child.clone()).or_default();
        }
        if let Some(parent) = &level.parent {
            let list = connections.entry(parent.clone()).or_default();
            for child in &level.children {
                push_unique(list, urls.url(child));
            }
        }
    }
    (stages, connections)
}
