//! # Armada Agent
//!
//! Minimal service that honors what the deployer expects of every agent:
//! it reads its identity and peer URLs from the launch environment and
//! answers `GET /health` once it is listening. `GET /info` echoes what it was
//! handed, which makes it useful for checking a topology end to end.

use armada_core::{endpoints, handoff, ConfigMap, VERSION};
use armada_registry::AgentRegistration;
use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use clap::Args;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

pub const SERVICE_NAME: &str = "armada-agent";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{var} is not a JSON object: {reason}")]
    InvalidConfig { var: &'static str, reason: String },
}

/// Launch settings; every field can come from the deployer's handoff
/// environment.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    #[arg(long, env = handoff::AGENT_ID, default_value = "armada-agent")]
    pub id: String,

    #[arg(long = "type", env = handoff::AGENT_TYPE, default_value = "generic")]
    pub agent_type: String,

    #[arg(long, env = "ARMADA_AGENT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = handoff::PORT, default_value_t = 8000)]
    pub port: u16,

    /// Comma-separated peer base URLs
    #[arg(long, env = handoff::CONNECTED_AGENTS, default_value = "")]
    pub connected_agents: String,

    /// JSON object with the agent's configuration
    #[arg(long, env = handoff::AGENT_CONFIG, default_value = "{}")]
    pub config: String,

    /// Registry to announce this agent to
    #[arg(long, env = handoff::REGISTRY_URL)]
    pub registry_url: Option<String>,

    /// URL peers should use to reach this agent; defaults to localhost and the port
    #[arg(long, env = "ARMADA_AGENT_URL")]
    pub advertise_url: Option<String>,
}

impl AgentSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn peers(&self) -> Vec<String> {
        handoff::split_urls(&self.connected_agents)
    }

    pub fn config_map(&self) -> Result<ConfigMap, AgentError> {
        serde_json::from_str(&self.config).map_err(|e| AgentError::InvalidConfig {
            var: handoff::AGENT_CONFIG,
            reason: e.to_string(),
        })
    }

    pub fn public_url(&self) -> String {
        self.advertise_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

#[derive(Debug, Clone)]
pub struct AgentState {
    pub id: String,
    pub agent_type: String,
    pub url: String,
    pub peers: Vec<String>,
    pub config: ConfigMap,
    pub started_at: DateTime<Utc>,
}

impl AgentState {
    pub fn from_settings(settings: &AgentSettings) -> Result<Self, AgentError> {
        Ok(Self {
            id: settings.id.clone(),
            agent_type: settings.agent_type.clone(),
            url: settings.public_url(),
            peers: settings.peers(),
            config: settings.config_map()?,
            started_at: Utc::now(),
        })
    }

    /// What this agent announces to a registry. The agent type doubles as
    /// its only skill and tag.
    pub fn registration(&self) -> AgentRegistration {
        let description = self
            .config
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut metadata = ConfigMap::new();
        metadata.insert("peers".to_string(), json!(self.peers));

        AgentRegistration {
            id: self.id.clone(),
            name: self.id.clone(),
            url: self.url.clone(),
            description,
            skills: vec![json!({ "id": self.agent_type, "name": self.agent_type })],
            tags: vec![self.agent_type.clone()],
            metadata,
        }
    }
}

pub fn router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::INFO, get(info))
        .with_state(state)
}

#[instrument(skip(state))]
async fn health_check(State(state): State<Arc<AgentState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "agent_id": state.id,
        "version": VERSION
    }))
}

#[instrument(skip(state))]
async fn info(State(state): State<Arc<AgentState>>) -> Json<Value> {
    let uptime = Utc::now() - state.started_at;
    Json(json!({
        "id": state.id,
        "type": state.agent_type,
        "url": state.url,
        "connected_agents": state.peers,
        "config": state.config,
        "started_at": state.started_at,
        "uptime_seconds": uptime.num_seconds(),
    }))
}
