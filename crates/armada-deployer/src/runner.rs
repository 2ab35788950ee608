//! Runner abstraction
//!
//! A runner starts one agent process and hands it its peers. The only
//! coupling between Armada and the launched process is the environment:
//! `CONNECTED_AGENTS` carries the comma-joined peer URLs, alongside the
//! agent's id, type, JSON config and port. Static `environment` entries from
//! the job are applied last and may override any of these.

use armada_core::{handoff, AgentConfig, AgentId, ArmadaError, DeploymentTarget, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long `terminate` waits for a killed process to be reaped.
pub const TERMINATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque handle returned by [`AgentRunner::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub id: Uuid,
    pub agent_id: AgentId,
    /// Name of the deployment target the process was started on.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    pub fn new(agent: &AgentConfig, pid: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent.id.clone(),
            target: agent.target().name().to_string(),
            pid,
            started_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Launches `agent`, telling it to call `connected_urls`.
    async fn start(&self, agent: &AgentConfig, connected_urls: &[String]) -> Result<ProcessHandle>;

    /// Crash detection; never used to gate deployment.
    async fn is_alive(&self, handle: &ProcessHandle) -> bool;

    async fn terminate(&self, handle: &ProcessHandle) -> Result<()>;
}

/// Environment handed to a launched agent, in application order.
pub fn handoff_environment(
    agent: &AgentConfig,
    connected_urls: &[String],
) -> Result<Vec<(String, String)>> {
    let mut env = vec![
        (handoff::AGENT_ID.to_string(), agent.id.clone()),
        (handoff::AGENT_TYPE.to_string(), agent.agent_type.clone()),
        (
            handoff::AGENT_CONFIG.to_string(),
            serde_json::to_string(&agent.config)?,
        ),
        (
            handoff::CONNECTED_AGENTS.to_string(),
            handoff::join_urls(connected_urls),
        ),
    ];
    if let Some(port) = agent.port()? {
        env.push((handoff::PORT.to_string(), port.to_string()));
    }
    env.extend(
        agent
            .deployment
            .environment
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    Ok(env)
}

/// Starts agents as child processes of the current process.
#[derive(Default)]
pub struct LocalProcessRunner {
    children: Mutex<HashMap<Uuid, Child>>,
}

impl std::fmt::Debug for LocalProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProcessRunner")
            .field("children_count", &self.children.lock().len())
            .finish()
    }
}

impl LocalProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(agent: &AgentConfig, connected_urls: &[String]) -> Result<Command> {
        let mut command = Command::new(&agent.module);
        command
            .args(&agent.args)
            .envs(handoff_environment(agent, connected_urls)?)
            .stdin(Stdio::null());
        Ok(command)
    }
}

#[async_trait]
impl AgentRunner for LocalProcessRunner {
    async fn start(&self, agent: &AgentConfig, connected_urls: &[String]) -> Result<ProcessHandle> {
        if *agent.target() != DeploymentTarget::Localhost {
            return Err(ArmadaError::UnsupportedTarget {
                agent_id: agent.id.clone(),
                target: agent.target().name().to_string(),
            });
        }

        let child = Self::command(agent, connected_urls)?
            .spawn()
            .map_err(|e| ArmadaError::Runner {
                agent_id: agent.id.clone(),
                reason: format!("failed to spawn '{}': {}", agent.module, e),
            })?;

        let handle = ProcessHandle::new(agent, child.id());
        info!(
            agent = %agent.id,
            module = %agent.module,
            pid = ?handle.pid,
            peers = connected_urls.len(),
            "Started local agent process"
        );
        self.children.lock().insert(handle.id, child);
        Ok(handle)
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        let mut children = self.children.lock();
        match children.get_mut(&handle.id).map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!(agent = %handle.agent_id, %status, "Agent process has exited");
                false
            }
            Some(Err(e)) => {
                warn!(agent = %handle.agent_id, error = %e, "Failed to poll agent process");
                false
            }
            None => false,
        }
    }

    async fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        let child = self.children.lock().remove(&handle.id);
        let Some(mut child) = child else {
            return Err(ArmadaError::AgentNotFound {
                agent_id: handle.agent_id.clone(),
            });
        };

        // Already-exited children make start_kill fail; reaping still applies.
        if let Err(e) = child.start_kill() {
            debug!(agent = %handle.agent_id, error = %e, "Kill signal not delivered");
        }
        match tokio::time::timeout(TERMINATE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                info!(agent = %handle.agent_id, %status, "Agent process terminated");
                Ok(())
            }
            Ok(Err(e)) => Err(ArmadaError::Runner {
                agent_id: handle.agent_id.clone(),
                reason: format!("failed to reap process: {}", e),
            }),
            Err(_elapsed) => Err(ArmadaError::Runner {
                agent_id: handle.agent_id.clone(),
                reason: format!(
                    "process did not exit within {}s",
                    TERMINATE_TIMEOUT.as_secs()
                ),
            }),
        }
    }
}

/// Placeholder for agents on `remote` hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteRunner;

/// Placeholder for agents in `container` targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerRunner;

macro_rules! unsupported_runner {
    ($runner:ty, $target:literal) => {
        #[async_trait]
        impl AgentRunner for $runner {
            async fn start(&self, agent: &AgentConfig, _connected_urls: &[String]) -> Result<ProcessHandle> {
                Err(ArmadaError::UnsupportedTarget {
                    agent_id: agent.id.clone(),
                    target: $target.to_string(),
                })
            }

            async fn is_alive(&self, _handle: &ProcessHandle) -> bool {
                false
            }

            async fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
                Err(ArmadaError::UnsupportedTarget {
                    agent_id: handle.agent_id.clone(),
                    target: $target.to_string(),
                })
            }
        }
    };
}

unsupported_runner!(RemoteRunner, "remote");
unsupported_runner!(ContainerRunner, "container");

/// Routes each agent to the runner for its deployment target.
#[derive(Clone)]
pub struct TargetRunner {
    local: Arc<dyn AgentRunner>,
    remote: Arc<dyn AgentRunner>,
    container: Arc<dyn AgentRunner>,
}

impl Default for TargetRunner {
    fn default() -> Self {
        Self {
            local: Arc::new(LocalProcessRunner::new()),
            remote: Arc::new(RemoteRunner),
            container: Arc::new(ContainerRunner),
        }
    }
}

impl TargetRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(mut self, runner: Arc<dyn AgentRunner>) -> Self {
        self.remote = runner;
        self
    }

    pub fn with_container(mut self, runner: Arc<dyn AgentRunner>) -> Self {
        self.container = runner;
        self
    }

    fn for_target(&self, target: &str) -> &Arc<dyn AgentRunner> {
        match target {
            "remote" => &self.remote,
            "container" => &self.container,
            _ => &self.local,
        }
    }
}

#[async_trait]
impl AgentRunner for TargetRunner {
    async fn start(&self, agent: &AgentConfig, connected_urls: &[String]) -> Result<ProcessHandle> {
        self.for_target(agent.target().name())
            .start(agent, connected_urls)
            .await
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> bool {
        self.for_target(&handle.target).is_alive(handle).await
    }

    async fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        self.for_target(&handle.target).terminate(handle).await
    }
}
