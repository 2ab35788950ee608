//! Typed HTTP client for a running registry.

use crate::registry::{AgentRegistration, RegisteredAgent, RegistryStats, SearchQuery};
use armada_core::endpoints;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum RegistryClientError {
    #[error("Agent not found in registry: {agent_id}")]
    NotFound { agent_id: String },

    #[error("Registry returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = std::result::Result<T, RegistryClientError>;

#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn agent_url(&self, template: &str, id: &str) -> String {
        self.url(&template.replace("{id}", id))
    }

    pub async fn register(&self, registration: &AgentRegistration) -> ClientResult<RegisteredAgent> {
        debug!(agent = %registration.id, registry = %self.base_url, "Registering agent");
        let response = self
            .http
            .post(self.url(endpoints::AGENTS_REGISTER))
            .timeout(self.timeout)
            .json(registration)
            .send()
            .await?;
        decode(response, &registration.id).await
    }

    pub async fn deregister(&self, id: &str) -> ClientResult<()> {
        let response = self
            .http
            .delete(self.agent_url(endpoints::AGENT, id))
            .timeout(self.timeout)
            .send()
            .await?;
        decode::<Value>(response, id).await.map(|_| ())
    }

    pub async fn get(&self, id: &str) -> ClientResult<RegisteredAgent> {
        let response = self
            .http
            .get(self.agent_url(endpoints::AGENT, id))
            .timeout(self.timeout)
            .send()
            .await?;
        decode(response, id).await
    }

    pub async fn list(&self, healthy_only: bool) -> ClientResult<Vec<RegisteredAgent>> {
        let response = self
            .http
            .get(self.url(endpoints::AGENTS))
            .query(&[("healthy_only", healthy_only)])
            .timeout(self.timeout)
            .send()
            .await?;
        decode(response, "").await
    }

    pub async fn search(&self, query: &SearchQuery) -> ClientResult<Vec<RegisteredAgent>> {
        let response = self
            .http
            .get(self.url(endpoints::AGENTS_SEARCH))
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        decode(response, "").await
    }

    pub async fn heartbeat(&self, id: &str) -> ClientResult<RegisteredAgent> {
        let response = self
            .http
            .post(self.agent_url(endpoints::AGENT_HEARTBEAT, id))
            .timeout(self.timeout)
            .send()
            .await?;
        decode(response, id).await
    }

    pub async fn stats(&self) -> ClientResult<RegistryStats> {
        let response = self
            .http
            .get(self.url(endpoints::HEALTH))
            .timeout(self.timeout)
            .send()
            .await?;
        decode(response, "").await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, agent_id: &str) -> ClientResult<T> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND && !agent_id.is_empty() {
        return Err(RegistryClientError::NotFound {
            agent_id: agent_id.to_string(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        return Err(RegistryClientError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}
