//! Registry state
//!
//! One mutex guards the whole agent map. Registration, deregistration,
//! health bookkeeping and eviction all go through it, and reads take a
//! snapshot under the same lock. The lock is never held across a network
//! call: a health sweep snapshots `(id, url, revision)`, probes without the
//! lock, then applies results only to agents whose revision is unchanged.

use crate::error::RegistryError;
use armada_core::ConfigMap;
use armada_health::{HealthProbe, HealthStatus};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;
pub const DEFAULT_REMOVAL_THRESHOLD: u32 = 10;

/// Body of `POST /agents/register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// Free-form capability descriptors: plain strings or objects with
    /// `id`/`name`/`description` fields.
    #[serde(default)]
    pub skills: Vec<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: ConfigMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: String,
    pub skills: Vec<Value>,
    pub tags: Vec<String>,
    pub metadata: ConfigMap,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub health_status: HealthStatus,
    pub consecutive_failures: u32,
    #[serde(skip)]
    revision: u64,
}

impl RegisteredAgent {
    pub fn is_healthy(&self) -> bool {
        self.health_status == HealthStatus::Healthy
    }

    fn has_skill(&self, needle: &str) -> bool {
        self.skills.iter().any(|skill| match skill {
            Value::String(text) => contains_ignore_case(text, needle),
            Value::Object(fields) => ["name", "description", "id"].iter().any(|key| {
                fields
                    .get(*key)
                    .and_then(Value::as_str)
                    .is_some_and(|text| contains_ignore_case(text, needle))
            }),
            _ => false,
        })
    }

    fn has_tag(&self, needle: &str) -> bool {
        self.tags.iter().any(|tag| contains_ignore_case(tag, needle))
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn default_true() -> bool {
    true
}

/// Criteria for `search`; all given criteria must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub healthy_only: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            skill: None,
            tag: None,
            name: None,
            healthy_only: true,
        }
    }
}

impl SearchQuery {
    fn matches(&self, agent: &RegisteredAgent) -> bool {
        if self.healthy_only && !agent.is_healthy() {
            return false;
        }
        if let Some(skill) = &self.skill {
            if !agent.has_skill(skill) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !agent.has_tag(tag) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !contains_ignore_case(&agent.name, name) {
                return false;
            }
        }
        true
    }
}

/// When failing agents are demoted and evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    pub unhealthy_threshold: u32,
    pub removal_threshold: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
            removal_threshold: DEFAULT_REMOVAL_THRESHOLD,
        }
    }
}

impl HealthPolicy {
    pub fn new(unhealthy_threshold: u32, removal_threshold: u32) -> Result<Self, RegistryError> {
        if unhealthy_threshold == 0 || removal_threshold <= unhealthy_threshold {
            return Err(RegistryError::InvalidThresholds {
                unhealthy: unhealthy_threshold,
                removal: removal_threshold,
            });
        }
        Ok(Self {
            unhealthy_threshold,
            removal_threshold,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub healthy_agents: usize,
    pub unhealthy_agents: usize,
}

/// Outcome of one health sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Results applied; equals `healthy + failed`.
    pub checked: usize,
    pub healthy: usize,
    pub failed: usize,
    /// Results dropped because the agent changed while its check ran.
    pub discarded: usize,
    pub removed: Vec<String>,
}

#[derive(Debug)]
pub struct AgentRegistry {
    agents: Mutex<IndexMap<String, RegisteredAgent>>,
    policy: HealthPolicy,
    revisions: AtomicU64,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(HealthPolicy::default())
    }
}

impl AgentRegistry {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            agents: Mutex::new(IndexMap::new()),
            policy,
            revisions: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> HealthPolicy {
        self.policy
    }

    /// Inserts or fully replaces the registration for `registration.id`.
    ///
    /// A re-registering agent is assumed freshly started, so it comes back
    /// healthy with no recorded failures.
    pub fn register(&self, registration: AgentRegistration) -> RegisteredAgent {
        let now = Utc::now();
        let agent = RegisteredAgent {
            id: registration.id,
            name: registration.name,
            url: registration.url,
            description: registration.description,
            skills: registration.skills,
            tags: registration.tags,
            metadata: registration.metadata,
            registered_at: now,
            last_seen: now,
            health_status: HealthStatus::Healthy,
            consecutive_failures: 0,
            revision: self.revisions.fetch_add(1, Ordering::Relaxed),
        };

        let previous = self
            .agents
            .lock()
            .insert(agent.id.clone(), agent.clone());
        match previous {
            Some(old) => info!(agent = %agent.id, old_url = %old.url, url = %agent.url, "Agent re-registered"),
            None => info!(agent = %agent.id, url = %agent.url, "Agent registered"),
        }
        agent
    }

    /// Returns whether the agent existed.
    pub fn deregister(&self, id: &str) -> bool {
        let removed = self.agents.lock().shift_remove(id).is_some();
        if removed {
            info!(agent = %id, "Agent deregistered");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<RegisteredAgent> {
        self.agents.lock().get(id).cloned()
    }

    pub fn list(&self, healthy_only: bool) -> Vec<RegisteredAgent> {
        self.agents
            .lock()
            .values()
            .filter(|agent| !healthy_only || agent.is_healthy())
            .cloned()
            .collect()
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<RegisteredAgent> {
        self.agents
            .lock()
            .values()
            .filter(|agent| query.matches(agent))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let agents = self.agents.lock();
        let healthy = agents.values().filter(|a| a.is_healthy()).count();
        let unhealthy = agents
            .values()
            .filter(|a| a.health_status == HealthStatus::Unhealthy)
            .count();
        RegistryStats {
            total_agents: agents.len(),
            healthy_agents: healthy,
            unhealthy_agents: unhealthy,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.lock().is_empty()
    }

    /// Agent-initiated liveness signal; same effect as a passing check.
    pub fn heartbeat(&self, id: &str) -> Option<RegisteredAgent> {
        let mut agents = self.agents.lock();
        let agent = agents.get_mut(id)?;
        mark_healthy(agent);
        Some(agent.clone())
    }

    pub fn record_success(&self, id: &str) -> bool {
        match self.agents.lock().get_mut(id) {
            Some(agent) => {
                mark_healthy(agent);
                true
            }
            None => false,
        }
    }

    /// Counts a failed check and returns the agent's new status.
    pub fn record_failure(&self, id: &str) -> Option<HealthStatus> {
        let mut agents = self.agents.lock();
        let agent = agents.get_mut(id)?;
        Some(mark_failed(agent, self.policy))
    }

    /// Removes every agent whose failures reached the removal threshold.
    pub fn evict_failed(&self) -> Vec<String> {
        let threshold = self.policy.removal_threshold;
        let mut removed = Vec::new();
        self.agents.lock().retain(|id, agent| {
            let keep = agent.consecutive_failures < threshold;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });

        for id in &removed {
            warn!(agent = %id, threshold, "Agent auto-removed after repeated health check failures");
        }
        removed
    }

    /// Probes every registered agent once, then evicts the ones that crossed
    /// the removal threshold.
    pub async fn check_all(&self, probe: &HealthProbe) -> SweepSummary {
        let snapshot: Vec<(String, String, u64)> = self
            .agents
            .lock()
            .values()
            .map(|agent| (agent.id.clone(), agent.url.clone(), agent.revision))
            .collect();

        let results = join_all(snapshot.into_iter().map(|(id, url, revision)| async move {
            let result = probe.check(&url).await;
            (id, revision, result)
        }))
        .await;

        let mut summary = SweepSummary::default();
        {
            let mut agents = self.agents.lock();
            for (id, revision, result) in results {
                // Re-registered or removed while the probe was in flight.
                let Some(agent) = agents.get_mut(&id).filter(|a| a.revision == revision) else {
                    debug!(agent = %id, "Discarding stale health check result");
                    summary.discarded += 1;
                    continue;
                };
                match result {
                    Ok(()) => {
                        mark_healthy(agent);
                        summary.healthy += 1;
                    }
                    Err(e) => {
                        debug!(agent = %id, error = %e, "Health check failed");
                        mark_failed(agent, self.policy);
                        summary.failed += 1;
                    }
                }
                summary.checked += 1;
            }
        }

        summary.removed = self.evict_failed();
        summary
    }
}

fn mark_healthy(agent: &mut RegisteredAgent) {
    if agent.health_status != HealthStatus::Healthy {
        info!(agent = %agent.id, from = %agent.health_status, "Agent recovered");
    }
    agent.health_status = HealthStatus::Healthy;
    agent.consecutive_failures = 0;
    agent.last_seen = Utc::now();
}

fn mark_failed(agent: &mut RegisteredAgent, policy: HealthPolicy) -> HealthStatus {
    agent.consecutive_failures = agent.consecutive_failures.saturating_add(1);
    if agent.consecutive_failures >= policy.unhealthy_threshold
        && agent.health_status != HealthStatus::Unhealthy
    {
        warn!(
            agent = %agent.id,
            failures = agent.consecutive_failures,
            "Agent marked unhealthy"
        );
        agent.health_status = HealthStatus::Unhealthy;
    }
    agent.health_status
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn registration(id: &str, url: &str) -> AgentRegistration {
        AgentRegistration {
            id: id.to_string(),
            name: format!("{} agent", id),
            url: url.to_string(),
            description: String::new(),
            skills: vec![],
            tags: vec![],
            metadata: ConfigMap::new(),
        }
    }

    #[test]
    fn test_register_is_an_upsert() {
        let registry = AgentRegistry::default();

        registry.register(registration("writer", "http://localhost:9001"));
        registry.record_failure("writer");
        let second = registry.register(registration("writer", "http://localhost:9101"));

        assert_eq!(registry.list(false).len(), 1);
        assert_eq!(second.url, "http://localhost:9101");
        assert_eq!(second.consecutive_failures, 0);
        assert_eq!(registry.get("writer").unwrap().url, "http://localhost:9101");
    }

    #[test]
    fn test_deregister_reports_existence() {
        let registry = AgentRegistry::default();
        registry.register(registration("writer", "http://localhost:9001"));

        assert!(registry.deregister("writer"));
        assert!(!registry.deregister("writer"));
        assert!(registry.get("writer").is_none());
    }

    #[test]
    fn test_failure_thresholds() {
        let registry = AgentRegistry::new(HealthPolicy::new(2, 4).unwrap());
        registry.register(registration("flaky", "http://localhost:9001"));

        assert_eq!(registry.record_failure("flaky"), Some(HealthStatus::Healthy));
        assert_eq!(registry.record_failure("flaky"), Some(HealthStatus::Unhealthy));
        assert_eq!(registry.record_failure("flaky"), Some(HealthStatus::Unhealthy));
        assert!(registry.evict_failed().is_empty());

        let agent = registry.get("flaky").unwrap();
        assert_eq!(agent.consecutive_failures, 3);
        assert!(registry.list(true).is_empty());
        assert_eq!(registry.list(false).len(), 1);

        registry.record_failure("flaky");
        assert_eq!(registry.evict_failed(), vec!["flaky".to_string()]);
        assert!(registry.get("flaky").is_none());
        assert!(registry.list(false).is_empty());
    }

    #[test]
    fn test_single_success_restores_health() {
        let registry = AgentRegistry::new(HealthPolicy::new(1, 5).unwrap());
        registry.register(registration("flaky", "http://localhost:9001"));

        registry.record_failure("flaky");
        assert!(!registry.get("flaky").unwrap().is_healthy());

        assert!(registry.record_success("flaky"));
        let agent = registry.get("flaky").unwrap();
        assert!(agent.is_healthy());
        assert_eq!(agent.consecutive_failures, 0);
        assert!(!registry.record_success("ghost"));
    }

    #[test]
    fn test_policy_requires_removal_above_unhealthy() {
        assert!(HealthPolicy::new(3, 3).is_err());
        assert!(HealthPolicy::new(0, 3).is_err());
        assert!(HealthPolicy::new(3, 4).is_ok());
    }

    #[test]
    fn test_search_criteria() {
        let registry = AgentRegistry::default();
        let mut writer = registration("writer", "http://localhost:9001");
        writer.name = "Report Writer".to_string();
        writer.skills = vec![json!({"id": "summarize", "name": "Summarization", "description": "Condense long text"})];
        writer.tags = vec!["NLP".to_string()];
        registry.register(writer);

        let mut fetcher = registration("fetcher", "http://localhost:9002");
        fetcher.skills = vec![json!("web-search")];
        fetcher.tags = vec!["io".to_string()];
        registry.register(fetcher);

        let search = |query: SearchQuery| -> Vec<String> {
            registry.search(&query).into_iter().map(|a| a.id).collect()
        };

        assert_eq!(
            search(SearchQuery {
                skill: Some("CONDENSE".to_string()),
                ..SearchQuery::default()
            }),
            vec!["writer"]
        );
        assert_eq!(
            search(SearchQuery {
                skill: Some("search".to_string()),
                ..SearchQuery::default()
            }),
            vec!["fetcher"]
        );
        assert_eq!(
            search(SearchQuery {
                tag: Some("nlp".to_string()),
                name: Some("writer".to_string()),
                ..SearchQuery::default()
            }),
            vec!["writer"]
        );
        assert!(search(SearchQuery {
            tag: Some("nlp".to_string()),
            name: Some("fetch".to_string()),
            ..SearchQuery::default()
        })
        .is_empty());
        assert_eq!(search(SearchQuery::default()).len(), 2);
    }

    #[test]
    fn test_search_is_healthy_only_by_default() {
        let registry = AgentRegistry::new(HealthPolicy::new(1, 5).unwrap());
        registry.register(registration("down", "http://localhost:9001"));
        registry.record_failure("down");

        assert!(registry.search(&SearchQuery::default()).is_empty());
        let all = SearchQuery {
            healthy_only: false,
            ..SearchQuery::default()
        };
        assert_eq!(registry.search(&all).len(), 1);
    }

    #[test]
    fn test_stats_and_heartbeat() {
        let registry = AgentRegistry::new(HealthPolicy::new(1, 5).unwrap());
        registry.register(registration("a", "http://localhost:9001"));
        registry.register(registration("b", "http://localhost:9002"));
        registry.record_failure("b");

        assert_eq!(
            registry.stats(),
            RegistryStats {
                total_agents: 2,
                healthy_agents: 1,
                unhealthy_agents: 1,
            }
        );

        assert!(registry.heartbeat("b").unwrap().is_healthy());
        assert!(registry.heartbeat("ghost").is_none());
        assert_eq!(registry.stats().healthy_agents, 2);
    }

    #[tokio::test]
    async fn test_check_all_counts_failures_and_evicts() {
        let registry = AgentRegistry::new(HealthPolicy::new(1, 2).unwrap());
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", closed.local_addr().unwrap());
        drop(closed);
        registry.register(registration("gone", &url));
        let probe = HealthProbe::new(Duration::from_millis(500));

        let first = registry.check_all(&probe).await;
        assert_eq!(first.failed, 1);
        assert_eq!(first.checked, first.healthy + first.failed);
        assert_eq!(first.discarded, 0);
        assert!(first.removed.is_empty());
        assert_eq!(
            registry.get("gone").unwrap().health_status,
            HealthStatus::Unhealthy
        );

        let second = registry.check_all(&probe).await;
        assert_eq!(second.removed, vec!["gone".to_string()]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_check_all_ignores_agents_changed_during_check() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new().route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                StatusCode::SERVICE_UNAVAILABLE
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let registry = Arc::new(AgentRegistry::new(HealthPolicy::new(1, 2).unwrap()));
        registry.register(registration("a", &url));
        registry.register(registration("b", &url));
        registry.record_failure("a");

        let sweeping = registry.clone();
        let sweep = tokio::spawn(async move {
            sweeping
                .check_all(&HealthProbe::new(Duration::from_secs(2)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        registry.register(registration("a", &url));
        assert!(registry.deregister("b"));

        let summary = sweep.await.unwrap();
        assert_eq!(summary.discarded, 2);
        assert_eq!(summary.checked, 0);
        assert!(summary.removed.is_empty());

        let a = registry.get("a").unwrap();
        assert_eq!(a.consecutive_failures, 0);
        assert!(a.is_healthy());
        assert!(registry.get("b").is_none());
    }
}
