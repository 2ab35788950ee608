//! Staged deployment
//!
//! Stages run strictly in plan order. Inside a stage every agent is started
//! and health-polled concurrently, and the next stage only begins once all
//! of them answer `/health`. A poll failure just means "not ready yet"; only
//! exceeding the job's per-agent timeout aborts the deployment. Agents that
//! were already started are left running when that happens.

use crate::runner::{AgentRunner, ProcessHandle};
use armada_core::{AgentId, ArmadaError, DeploymentPlan, JobDefinition, Result};
use armada_health::{HealthProbe, ProbeError};
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Floor for the health poll interval, so a zero interval cannot spin.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A started agent and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProcess {
    pub agent_id: AgentId,
    pub url: String,
    pub handle: ProcessHandle,
}

/// Result of a successful deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployedJob {
    pub job_id: Uuid,
    pub job: JobDefinition,
    pub plan: DeploymentPlan,
    pub processes: IndexMap<AgentId, AgentProcess>,
}

impl DeployedJob {
    pub fn url(&self, agent_id: &str) -> Option<&str> {
        self.plan.url(agent_id)
    }

    pub fn process(&self, agent_id: &str) -> Option<&AgentProcess> {
        self.processes.get(agent_id)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &AgentId> {
        self.processes.keys()
    }
}

pub struct Deployer {
    runner: Arc<dyn AgentRunner>,
    probe: HealthProbe,
    poll_interval: Option<Duration>,
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("probe", &self.probe)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Deployer {
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self {
            runner,
            probe: HealthProbe::default(),
            poll_interval: None,
        }
    }

    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Overrides the job's `health_check_interval`.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn runner(&self) -> &Arc<dyn AgentRunner> {
        &self.runner
    }

    #[instrument(skip_all, fields(job = %job.metadata.name))]
    pub async fn deploy(&self, job: &JobDefinition, plan: &DeploymentPlan) -> Result<DeployedJob> {
        let job_id = Uuid::new_v4();
        let timeout = job.deployment.timeout();
        let interval = self
            .poll_interval
            .unwrap_or_else(|| job.deployment.health_check_interval());

        info!(
            %job_id,
            stages = plan.stages.len(),
            timeout_secs = timeout.as_secs(),
            "Starting deployment"
        );

        let mut processes = IndexMap::new();
        for (index, stage) in plan.stages.iter().enumerate() {
            info!(stage = index + 1, agents = ?stage, "Starting stage");
            let started = try_join_all(
                stage
                    .iter()
                    .map(|agent_id| self.launch(job, plan, agent_id, timeout, interval)),
            )
            .await?;

            processes.extend(
                started
                    .into_iter()
                    .map(|process| (process.agent_id.clone(), process)),
            );
            info!(stage = index + 1, "Stage healthy");
        }

        info!(%job_id, agents = processes.len(), "Deployment complete");
        Ok(DeployedJob {
            job_id,
            job: job.clone(),
            plan: plan.clone(),
            processes,
        })
    }

    async fn launch(
        &self,
        job: &JobDefinition,
        plan: &DeploymentPlan,
        agent_id: &AgentId,
        timeout: Duration,
        interval: Duration,
    ) -> Result<AgentProcess> {
        let not_found = || ArmadaError::AgentNotFound {
            agent_id: agent_id.clone(),
        };
        let agent = job.agent(agent_id).ok_or_else(not_found)?;
        let url = plan.url(agent_id).ok_or_else(not_found)?;

        let handle = self
            .runner
            .start(agent, plan.connections_for(agent_id))
            .await?;
        self.wait_until_healthy(agent_id, url, timeout, interval)
            .await?;

        Ok(AgentProcess {
            agent_id: agent_id.clone(),
            url: url.to_string(),
            handle,
        })
    }

    /// Polls `url` until it is healthy or `timeout` of wall-clock time passes.
    ///
    /// `interval` is raised to at least [`MIN_POLL_INTERVAL`].
    pub async fn wait_until_healthy(
        &self,
        agent_id: &str,
        url: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let last_error = match self.probe.check(url).await {
                Ok(()) => {
                    info!(
                        agent = agent_id,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Agent healthy"
                    );
                    return Ok(());
                }
                Err(e @ ProbeError::Request { .. }) => {
                    warn!(agent = agent_id, attempt, error = %e, "Unexpected health check failure");
                    e
                }
                Err(e) => {
                    debug!(agent = agent_id, attempt, error = %e, "Agent not ready");
                    e
                }
            };

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ArmadaError::HealthTimeout {
                    agent_id: agent_id.to_string(),
                    elapsed_secs: elapsed.as_secs_f64(),
                    last_error: last_error.to_string(),
                });
            }
            tokio::time::sleep(interval.min(timeout - elapsed)).await;
        }
    }

    /// Terminates every process of `deployed`, last stage first.
    ///
    /// Failures are logged and do not stop the remaining terminations.
    pub async fn teardown(&self, deployed: &DeployedJob) {
        for stage in deployed.plan.stages.iter().rev() {
            for agent_id in stage {
                let Some(process) = deployed.processes.get(agent_id) else {
                    continue;
                };
                if let Err(e) = self.runner.terminate(&process.handle).await {
                    warn!(agent = %agent_id, error = %e, "Failed to terminate agent");
                }
            }
        }
        info!(job_id = %deployed.job_id, "Teardown complete");
    }
}
