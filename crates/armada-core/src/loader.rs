//! Job loader
//!
//! Parses a YAML (or JSON) job description and validates it before anything
//! is deployed. Validation runs in a fixed order and stops at the first
//! failure:
//!
//! 1. agent ids are unique
//! 2. every `localhost` agent's `module` resolves to an executable
//! 3. every agent referenced by the topology exists
//! 4. ports are present where required and do not collide on a host

use crate::agent::{AgentConfig, DeploymentTarget};
use crate::error::{ArmadaError, Result};
use crate::job::JobDefinition;
use indexmap::{IndexMap, IndexSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Decides whether an agent's launch command exists.
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, module: &str) -> bool;
}

impl<F> ModuleResolver for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn resolve(&self, module: &str) -> bool {
        self(module)
    }
}

/// Resolves explicit paths directly and bare names against `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathModuleResolver;

impl ModuleResolver for PathModuleResolver {
    fn resolve(&self, module: &str) -> bool {
        if module.is_empty() {
            return false;
        }
        if module.contains(std::path::MAIN_SEPARATOR) || module.contains('/') {
            return Path::new(module).is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(module).is_file()))
            .unwrap_or(false)
    }
}

pub struct JobLoader {
    resolver: Box<dyn ModuleResolver>,
}

impl std::fmt::Debug for JobLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLoader").finish_non_exhaustive()
    }
}

impl Default for JobLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLoader {
    pub fn new() -> Self {
        Self::with_resolver(PathModuleResolver)
    }

    pub fn with_resolver(resolver: impl ModuleResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }

    /// Loader that accepts every module; used for planning on a machine
    /// that will not launch the agents itself.
    pub fn without_module_check() -> Self {
        Self::with_resolver(|_: &str| true)
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<JobDefinition> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ArmadaError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.load_str(&source)
    }

    pub fn load_str(&self, source: &str) -> Result<JobDefinition> {
        let job: JobDefinition = serde_yaml::from_str(source).map_err(|e| ArmadaError::Parse {
            reason: e.to_string(),
        })?;

        self.validate(&job)?;

        info!(
            job = %job.metadata.name,
            agents = job.agents.len(),
            topology = job.topology.kind(),
            "Job definition loaded"
        );
        Ok(job)
    }

    /// Runs every validation pass against an already-parsed job.
    pub fn validate(&self, job: &JobDefinition) -> Result<()> {
        validate_unique_ids(job)?;
        self.validate_modules(job)?;
        validate_topology_references(job)?;
        validate_ports(job)?;
        warn_undeployed_agents(job);
        Ok(())
    }

    fn validate_modules(&self, job: &JobDefinition) -> Result<()> {
        for agent in &job.agents {
            // Remote and container binaries are not visible from here.
            if *agent.target() != DeploymentTarget::Localhost {
                debug!(agent = %agent.id, "Skipping module check for non-local target");
                continue;
            }
            if !self.resolver.resolve(&agent.module) {
                return Err(ArmadaError::ModuleNotFound {
                    agent_id: agent.id.clone(),
                    module: agent.module.clone(),
                });
            }
        }
        Ok(())
    }
}

fn validate_unique_ids(job: &JobDefinition) -> Result<()> {
    let mut seen = IndexSet::new();
    for agent in &job.agents {
        if !seen.insert(agent.id.as_str()) {
            return Err(ArmadaError::DuplicateAgentId {
                agent_id: agent.id.clone(),
            });
        }
    }
    Ok(())
}

pub(crate) fn validate_topology_references(job: &JobDefinition) -> Result<()> {
    for (field, agent_id) in job.topology.references() {
        if job.agent(agent_id).is_none() {
            return Err(ArmadaError::UnknownAgentReference {
                agent_id: agent_id.clone(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_ports(job: &JobDefinition) -> Result<()> {
    let mut claimed: IndexMap<(String, u16), &AgentConfig> = IndexMap::new();

    for agent in &job.agents {
        let host = match agent.target() {
            DeploymentTarget::Localhost => "localhost".to_string(),
            DeploymentTarget::Remote { host } => host.clone(),
            DeploymentTarget::Container { .. } => {
                // Containers get their own network namespace.
                agent.port()?;
                continue;
            }
        };

        let port = agent.required_port()?;
        if let Some(first) = claimed.get(&(host.clone(), port)) {
            return Err(ArmadaError::PortConflict {
                host,
                port,
                first: first.id.clone(),
                second: agent.id.clone(),
            });
        }
        claimed.insert((host, port), agent);
    }
    Ok(())
}

/// Agents that will not be deployed, with the reason.
fn undeployed_agents(job: &JobDefinition) -> Vec<(&AgentConfig, &'static str)> {
    let referenced: IndexSet<&str> = job
        .topology
        .references()
        .into_iter()
        .map(|(_, id)| id.as_str())
        .collect();
    let scheduled = job.topology.scheduled_agents();

    job.agents
        .iter()
        .filter_map(|agent| {
            if !referenced.contains(agent.id.as_str()) {
                Some((agent, "Agent is not referenced by the topology and will not be deployed"))
            } else if !scheduled.contains(&agent.id) {
                Some((agent, "Agent is referenced by the topology but never scheduled and will not be deployed"))
            } else {
                None
            }
        })
        .collect()
}

fn warn_undeployed_agents(job: &JobDefinition) {
    for (agent, message) in undeployed_agents(job) {
        warn!(agent = %agent.id, topology = job.topology.kind(), "{}", message);
    }
}
