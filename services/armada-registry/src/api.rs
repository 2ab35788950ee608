//! HTTP surface of the registry.

use crate::error::RegistryError;
use crate::registry::{AgentRegistration, AgentRegistry, RegisteredAgent, SearchQuery};
use armada_core::{endpoints, VERSION};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

pub const SERVICE_NAME: &str = "armada-registry";

pub fn router(registry: Arc<AgentRegistry>) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::AGENTS, get(list_agents))
        .route(endpoints::AGENTS_REGISTER, post(register_agent))
        .route(endpoints::AGENTS_SEARCH, get(search_agents))
        .route(endpoints::AGENT, get(get_agent).delete(deregister_agent))
        .route(endpoints::AGENT_HEARTBEAT, post(heartbeat))
        .with_state(registry)
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::AgentNotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::InvalidRegistration { .. } | RegistryError::InvalidThresholds { .. } => {
                StatusCode::BAD_REQUEST
            }
            RegistryError::Bind { .. } | RegistryError::Server(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    healthy_only: bool,
}

#[instrument(skip(registry))]
async fn health_check(State(registry): State<Arc<AgentRegistry>>) -> Json<Value> {
    let stats = registry.stats();
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": VERSION,
        "total_agents": stats.total_agents,
        "healthy_agents": stats.healthy_agents,
        "unhealthy_agents": stats.unhealthy_agents,
    }))
}

#[instrument(skip(registry, registration), fields(agent = %registration.id))]
async fn register_agent(
    State(registry): State<Arc<AgentRegistry>>,
    Json(registration): Json<AgentRegistration>,
) -> Result<Json<RegisteredAgent>, RegistryError> {
    if registration.id.trim().is_empty() {
        return Err(RegistryError::InvalidRegistration {
            reason: "id must not be empty".to_string(),
        });
    }
    if registration.url.trim().is_empty() {
        return Err(RegistryError::InvalidRegistration {
            reason: format!("agent '{}' has an empty url", registration.id),
        });
    }

    Ok(Json(registry.register(registration)))
}

#[instrument(skip(registry))]
async fn deregister_agent(
    State(registry): State<Arc<AgentRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RegistryError> {
    if !registry.deregister(&id) {
        return Err(RegistryError::AgentNotFound { agent_id: id });
    }
    Ok(Json(json!({ "status": "deregistered", "id": id })))
}

#[instrument(skip(registry))]
async fn get_agent(
    State(registry): State<Arc<AgentRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<RegisteredAgent>, RegistryError> {
    registry
        .get(&id)
        .map(Json)
        .ok_or(RegistryError::AgentNotFound { agent_id: id })
}

#[instrument(skip(registry))]
async fn list_agents(
    State(registry): State<Arc<AgentRegistry>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<RegisteredAgent>> {
    Json(registry.list(params.healthy_only))
}

#[instrument(skip(registry))]
async fn search_agents(
    State(registry): State<Arc<AgentRegistry>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<RegisteredAgent>> {
    Json(registry.search(&query))
}

#[instrument(skip(registry))]
async fn heartbeat(
    State(registry): State<Arc<AgentRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<RegisteredAgent>, RegistryError> {
    match registry.heartbeat(&id) {
        Some(agent) => {
            info!(agent = %id, "Heartbeat received");
            Ok(Json(agent))
        }
        None => Err(RegistryError::AgentNotFound { agent_id: id }),
    }
}
