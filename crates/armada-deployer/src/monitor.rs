//! Post-deployment health monitoring.
//!
//! The monitor only observes: each tick checks every agent once, reports the
//! result and logs state changes. It never restarts anything.

use crate::deployer::DeployedJob;
use crate::runner::AgentRunner;
use armada_core::AgentId;
use armada_health::{HealthProbe, HealthStatus};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentHealthReport {
    pub agent_id: AgentId,
    pub url: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Process liveness, when the monitor has a runner to ask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_alive: Option<bool>,
    pub checked_at: DateTime<Utc>,
}

impl AgentHealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// `healthy`, or the error observed.
    pub fn summary(&self) -> String {
        match &self.error {
            None => self.status.to_string(),
            Some(error) => error.clone(),
        }
    }
}

pub struct Monitor {
    probe: HealthProbe,
    runner: Option<Arc<dyn AgentRunner>>,
    interval: Duration,
}

impl Monitor {
    pub fn new(probe: HealthProbe, interval: Duration) -> Self {
        Self {
            probe,
            runner: None,
            interval,
        }
    }

    /// Also report whether each agent's process is still running.
    pub fn with_runner(mut self, runner: Arc<dyn AgentRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Checks every agent once, independently of each other.
    pub async fn check_once(&self, deployed: &DeployedJob) -> Vec<AgentHealthReport> {
        join_all(deployed.processes.values().map(|process| async move {
            let result = self.probe.check(&process.url).await;
            let process_alive = match &self.runner {
                Some(runner) => Some(runner.is_alive(&process.handle).await),
                None => None,
            };

            AgentHealthReport {
                agent_id: process.agent_id.clone(),
                url: process.url.clone(),
                status: if result.is_ok() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy
                },
                error: result.err().map(|e| e.to_string()),
                process_alive,
                checked_at: Utc::now(),
            }
        }))
        .await
    }

    /// Checks `deployed` every interval until `cancel` fires.
    ///
    /// An in-flight tick is always allowed to finish, so no request is left
    /// dangling when the loop stops.
    pub async fn run<F>(&self, deployed: &DeployedJob, cancel: CancellationToken, mut on_tick: F)
    where
        F: FnMut(&[AgentHealthReport]),
    {
        let mut previous: HashMap<AgentId, HealthStatus> = HashMap::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            job_id = %deployed.job_id,
            agents = deployed.processes.len(),
            interval_secs = self.interval.as_secs_f64(),
            "Monitoring deployment"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let reports = self.check_once(deployed).await;
            for report in &reports {
                log_transition(&mut previous, report);
            }
            on_tick(&reports);
        }

        info!(job_id = %deployed.job_id, "Monitor stopped");
    }
}

fn log_transition(previous: &mut HashMap<AgentId, HealthStatus>, report: &AgentHealthReport) {
    let before = previous.insert(report.agent_id.clone(), report.status);
    if before == Some(report.status) {
        return;
    }

    match report.status {
        HealthStatus::Healthy => info!(
            agent = %report.agent_id,
            from = %before.unwrap_or_default(),
            "Agent healthy"
        ),
        _ => warn!(
            agent = %report.agent_id,
            from = %before.unwrap_or_default(),
            error = report.error.as_deref().unwrap_or(""),
            process_alive = ?report.process_alive,
            "Agent unhealthy"
        ),
    }
}
