//! Property tests for the topology resolver

use armada_core::*;
use proptest::prelude::*;
use serde_json::json;

fn agent(index: usize) -> AgentConfig {
    let mut config = ConfigMap::new();
    config.insert("port".to_string(), json!(9000 + index));
    AgentConfig {
        id: format!("agent-{}", index),
        agent_type: "worker".to_string(),
        module: "worker-bin".to_string(),
        args: vec![],
        config,
        deployment: AgentDeployment::default(),
    }
}

fn job(size: usize, topology: TopologyConfig) -> JobDefinition {
    JobDefinition {
        metadata: JobMetadata {
            name: "prop".to_string(),
            version: "1".to_string(),
            description: String::new(),
        },
        agents: (0..size).map(agent).collect(),
        topology,
        deployment: DeploymentConfig::default(),
    }
}

fn id(index: usize) -> String {
    format!("agent-{}", index)
}

/// Random acyclic edge set: edges only run from lower to higher indices.
fn acyclic_edges() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|size| {
        let edge = (0..size - 1).prop_flat_map(move |from| (Just(from), (from + 1)..size));
        (Just(size), prop::collection::vec(edge, 1..30))
    })
}

fn dag(edges: &[(usize, usize)]) -> TopologyConfig {
    TopologyConfig::Dag {
        connections: edges
            .iter()
            .map(|(from, to)| DagConnection {
                from: id(*from),
                to: Targets::One(id(*to)),
            })
            .collect(),
    }
}

proptest! {
    #[test]
    fn dag_sources_start_strictly_before_targets((size, edges) in acyclic_edges()) {
        let plan = resolve(&job(size, dag(&edges))).unwrap();

        for (from, to) in &edges {
            let from_stage = plan.stage_of(&id(*from)).unwrap();
            let to_stage = plan.stage_of(&id(*to)).unwrap();
            prop_assert!(from_stage < to_stage);
        }
    }

    #[test]
    fn dag_with_back_edge_is_rejected((size, edges) in acyclic_edges()) {
        let (from, to) = edges[0];
        let mut cyclic = edges.clone();
        cyclic.push((to, from));

        let result = resolve(&job(size, dag(&cyclic)));
        prop_assert!(matches!(result, Err(ArmadaError::CycleDetected)));
    }

    #[test]
    fn mesh_connects_to_all_other_agents(size in 1usize..15) {
        let agents: Vec<String> = (0..size).map(id).collect();
        let plan = resolve(&job(size, TopologyConfig::Mesh { agents: agents.clone() })).unwrap();

        for agent in &agents {
            let peers = plan.connections_for(agent);
            prop_assert_eq!(peers.len(), size - 1);
            prop_assert!(!peers.contains(&plan.agent_urls[agent.as_str()]));
        }
    }

    #[test]
    fn pipeline_is_a_linear_chain(size in 1usize..15) {
        let stages: Vec<String> = (0..size).map(id).collect();
        let plan = resolve(&job(size, TopologyConfig::Pipeline { stages: stages.clone() })).unwrap();

        prop_assert_eq!(plan.stages.len(), size);
        for (i, agent) in stages.iter().enumerate() {
            prop_assert_eq!(plan.stages[i].clone(), vec![agent.clone()]);
            let expected: Vec<String> = stages
                .get(i + 1)
                .map(|next| vec![plan.agent_urls[next.as_str()].clone()])
                .unwrap_or_default();
            prop_assert_eq!(plan.connections_for(agent).to_vec(), expected);
        }
    }

    #[test]
    fn hub_connects_to_exactly_its_spokes(spoke_count in 0usize..12) {
        let spokes: Vec<String> = (1..=spoke_count).map(id).collect();
        let topology = TopologyConfig::HubSpoke { hub: id(0), spokes: spokes.clone() };
        let plan = resolve(&job(spoke_count + 1, topology)).unwrap();

        let mut hub = plan.connections_for(&id(0)).to_vec();
        hub.sort();
        let mut expected: Vec<String> = spokes
            .iter()
            .map(|s| plan.agent_urls[s.as_str()].clone())
            .collect();
        expected.sort();
        prop_assert_eq!(hub, expected);
        for spoke in &spokes {
            prop_assert!(plan.connections_for(spoke).is_empty());
        }
    }

    #[test]
    fn resolve_is_deterministic((size, edges) in acyclic_edges()) {
        let job = job(size, dag(&edges));
        prop_assert_eq!(resolve(&job).unwrap(), resolve(&job).unwrap());
    }
}
