//! BDD Tests for the reference agent

use armada_agent::{router, AgentSettings, AgentState};
use armada_health::HealthProbe;
use armada_registry::{RegistryClient, RegistryConfig, RegistryService, SearchQuery};
use cucumber::{given, then, when, World};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Default, World)]
struct AgentWorld {
    settings: Option<AgentSettings>,
    state: Option<Arc<AgentState>>,
    registry: Option<RegistryService>,
}

impl AgentWorld {
    fn state(&self) -> &AgentState {
        self.state.as_ref().expect("agent not started")
    }

    fn registry(&self) -> RegistryClient {
        RegistryClient::new(self.registry.as_ref().expect("no registry running").url())
    }
}

#[given("a running registry")]
async fn given_registry(world: &mut AgentWorld) {
    let config = RegistryConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..RegistryConfig::default()
    };
    world.registry = Some(RegistryService::start(&config).await.unwrap());
}

#[given(expr = "an agent {string} of type {string} connected to {string}")]
async fn given_agent(world: &mut AgentWorld, id: String, agent_type: String, peers: String) {
    world.settings = Some(AgentSettings {
        id,
        agent_type,
        host: "127.0.0.1".to_string(),
        port: 0,
        connected_agents: peers,
        config: "{}".to_string(),
        registry_url: None,
        advertise_url: None,
    });
}

#[when("the agent starts")]
async fn when_agent_starts(world: &mut AgentWorld) {
    let mut settings = world.settings.clone().unwrap();
    let listener = TcpListener::bind(settings.bind_addr()).await.unwrap();
    settings.port = listener.local_addr().unwrap().port();
    settings.advertise_url = Some(format!("http://127.0.0.1:{}", settings.port));

    let state = Arc::new(AgentState::from_settings(&settings).unwrap());
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    world.state = Some(state);
}

#[when("the agent registers with the registry")]
async fn when_agent_registers(world: &mut AgentWorld) {
    world
        .registry()
        .register(&world.state().registration())
        .await
        .unwrap();
}

#[then("its health endpoint should answer")]
async fn then_health_answers(world: &mut AgentWorld) {
    let probe = HealthProbe::new(Duration::from_secs(2));
    probe.check(&world.state().url).await.unwrap();
}

#[then(expr = "its info should list {int} connected agents")]
async fn then_info_lists_peers(world: &mut AgentWorld, count: usize) {
    let info: Value = reqwest::get(format!("{}/info", world.state().url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["connected_agents"].as_array().unwrap().len(), count);
}

#[then(expr = "searching the registry for skill {string} should return {string}")]
async fn then_search_returns(world: &mut AgentWorld, skill: String, id: String) {
    let query = SearchQuery {
        skill: Some(skill),
        ..SearchQuery::default()
    };
    let found = world.registry().search(&query).await.unwrap();
    let ids: Vec<String> = found.into_iter().map(|agent| agent.id).collect();
    assert_eq!(ids, vec![id]);
}

#[then(expr = "the registry should report agent {string} at the agent's URL")]
async fn then_registry_has_url(world: &mut AgentWorld, id: String) {
    let agent = world.registry().get(&id).await.unwrap();
    assert_eq!(agent.url, world.state().url);
}

#[tokio::main]
async fn main() {
    AgentWorld::run("tests/features").await;
}
