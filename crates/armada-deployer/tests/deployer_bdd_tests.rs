//! BDD Tests for staged deployment

use armada_core::*;
use armada_deployer::{AgentRunner, DeployedJob, Deployer, ProcessHandle};
use async_trait::async_trait;
use axum::{routing::get, Router};
use cucumber::{given, then, when, World};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Brings up a `/health` endpoint on the agent's reserved port when started.
#[derive(Debug, Default)]
struct ScriptedRunner {
    listeners: Mutex<HashMap<AgentId, std::net::TcpListener>>,
    broken: Mutex<HashSet<AgentId>>,
    started: Mutex<Vec<(AgentId, Vec<String>)>>,
    terminated: Mutex<Vec<AgentId>>,
}

impl ScriptedRunner {
    fn reserve(&self, agent_id: &str) -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        self.listeners.lock().insert(agent_id.to_string(), listener);
        port
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn start(&self, agent: &AgentConfig, connected_urls: &[String]) -> Result<ProcessHandle> {
        self.started
            .lock()
            .push((agent.id.clone(), connected_urls.to_vec()));

        let listener = self.listeners.lock().remove(&agent.id);
        let broken = self.broken.lock().contains(&agent.id);
        if let (Some(listener), false) = (listener, broken) {
            listener.set_nonblocking(true).unwrap();
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let app = Router::new().route("/health", get(|| async { "ok" }));
            tokio::spawn(async move {
                let _ = axum::serve(listener, app).await;
            });
        }
        Ok(ProcessHandle::new(agent, None))
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        !self.terminated.lock().contains(&handle.agent_id)
    }

    async fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        self.terminated.lock().push(handle.agent_id.clone());
        Ok(())
    }
}

#[derive(Debug, World)]
#[world(init = Self::new)]
struct DeployWorld {
    runner: Arc<ScriptedRunner>,
    job: Option<JobDefinition>,
    deployed: Option<DeployedJob>,
    last_error: Option<ArmadaError>,
}

impl DeployWorld {
    fn new() -> Self {
        Self {
            runner: Arc::new(ScriptedRunner::default()),
            job: None,
            deployed: None,
            last_error: None,
        }
    }

    fn started_ids(&self) -> Vec<AgentId> {
        self.runner
            .started
            .lock()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn handed_urls(&self, agent: &str) -> Vec<String> {
        self.runner
            .started
            .lock()
            .iter()
            .find(|(id, _)| id == agent)
            .map(|(_, urls)| urls.clone())
            .expect("Agent was not started")
    }
}

fn split(list: &str) -> Vec<String> {
    list.split(',').map(|s| s.trim().to_string()).collect()
}

#[given(expr = "a pipeline of {string}")]
async fn given_pipeline(world: &mut DeployWorld, stages: String) {
    let stages = split(&stages);
    let agents = stages
        .iter()
        .map(|id| {
            let mut config = ConfigMap::new();
            config.insert("port".to_string(), json!(world.runner.reserve(id)));
            AgentConfig {
                id: id.clone(),
                agent_type: "step".to_string(),
                module: "step-bin".to_string(),
                args: vec![],
                config,
                deployment: AgentDeployment::default(),
            }
        })
        .collect();

    world.job = Some(JobDefinition {
        metadata: JobMetadata {
            name: "etl".to_string(),
            version: "1".to_string(),
            description: String::new(),
        },
        agents,
        topology: TopologyConfig::Pipeline { stages },
        deployment: DeploymentConfig::default(),
    });
}

#[given(expr = "agent {string} never becomes healthy")]
async fn given_agent_never_healthy(world: &mut DeployWorld, agent: String) {
    world.runner.broken.lock().insert(agent);
}

#[given(expr = "a startup timeout of {int} seconds")]
async fn given_startup_timeout(world: &mut DeployWorld, seconds: u64) {
    world.job.as_mut().unwrap().deployment.timeout = seconds;
}

#[when("I deploy the job")]
async fn when_deploy(world: &mut DeployWorld) {
    let job = world.job.as_ref().expect("No job defined");
    let plan = resolve(job).expect("Job should resolve");
    let deployer =
        Deployer::new(world.runner.clone()).with_poll_interval(Duration::from_millis(100));

    match deployer.deploy(job, &plan).await {
        Ok(deployed) => world.deployed = Some(deployed),
        Err(e) => world.last_error = Some(e),
    }
}

#[then("the deployment should succeed")]
async fn then_deployment_succeeds(world: &mut DeployWorld) {
    assert!(
        world.last_error.is_none(),
        "Unexpected error: {:?}",
        world.last_error
    );
    let deployed = world.deployed.as_ref().unwrap();
    assert_eq!(deployed.processes.len(), world.job.as_ref().unwrap().agents.len());
}

#[then(expr = "agents should have started in the order {string}")]
async fn then_started_in_order(world: &mut DeployWorld, order: String) {
    assert_eq!(world.started_ids(), split(&order));
}

#[then(expr = "agent {string} should have been handed the URL of {string}")]
async fn then_handed_url_of(world: &mut DeployWorld, agent: String, peer: String) {
    let job = world.job.as_ref().unwrap();
    let expected = job.agent(&peer).unwrap().base_url().unwrap();
    assert_eq!(world.handed_urls(&agent), vec![expected]);
}

#[then(expr = "agent {string} should have been handed no URLs")]
async fn then_handed_no_urls(world: &mut DeployWorld, agent: String) {
    assert!(world.handed_urls(&agent).is_empty());
}

#[then(expr = "the deployment should fail for agent {string}")]
async fn then_deployment_fails_for(world: &mut DeployWorld, agent: String) {
    match world.last_error.as_ref() {
        Some(ArmadaError::HealthTimeout { agent_id, .. }) => assert_eq!(agent_id, &agent),
        other => panic!("Expected health timeout, got {:?}", other),
    }
}

#[then(expr = "agent {string} should not have been started")]
async fn then_not_started(world: &mut DeployWorld, agent: String) {
    assert!(!world.started_ids().contains(&agent));
}

#[then(expr = "agent {string} should still be running")]
async fn then_still_running(world: &mut DeployWorld, agent: String) {
    assert!(world.started_ids().contains(&agent));
    assert!(!world.runner.terminated.lock().contains(&agent));
}

#[tokio::main]
async fn main() {
    DeployWorld::run("tests/features").await;
}
