//! Lifecycle of a running registry: HTTP server plus the background sweep.

use crate::api;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::registry::AgentRegistry;
use armada_health::HealthProbe;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodically sweeps `registry` until `cancel` fires.
///
/// A sweep already in progress completes before the loop exits.
pub async fn run_health_checks(
    registry: Arc<AgentRegistry>,
    probe: HealthProbe,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; agents just registered need no probe yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let summary = registry.check_all(&probe).await;
        debug!(
            checked = summary.checked,
            healthy = summary.healthy,
            failed = summary.failed,
            discarded = summary.discarded,
            removed = summary.removed.len(),
            "Health sweep complete"
        );
    }

    info!("Health check loop stopped");
}

/// A started registry. Dropping it without calling [`stop`](Self::stop)
/// leaves the tasks running until the runtime shuts down.
#[derive(Debug)]
pub struct RegistryService {
    registry: Arc<AgentRegistry>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
    sweeper: JoinHandle<()>,
}

impl RegistryService {
    /// Binds `config.bind_addr()` and starts serving with a fresh registry.
    pub async fn start(config: &RegistryConfig) -> Result<Self> {
        let registry = Arc::new(AgentRegistry::new(config.policy()?));
        let addr = config.bind_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(RegistryError::Bind { addr, source }),
        };
        let probe = HealthProbe::new(config.check_timeout());
        Self::start_with(registry, listener, probe, config.check_interval())
    }

    /// Starts serving `registry` on an already-bound listener.
    pub fn start_with(
        registry: Arc<AgentRegistry>,
        listener: TcpListener,
        probe: HealthProbe,
        check_interval: Duration,
    ) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        let app = api::router(registry.clone());
        let shutdown = cancel.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        let sweeper = tokio::spawn(run_health_checks(
            registry.clone(),
            probe,
            check_interval,
            cancel.clone(),
        ));

        let policy = registry.policy();
        info!(
            addr = %local_addr,
            interval_secs = check_interval.as_secs_f64(),
            unhealthy_threshold = policy.unhealthy_threshold,
            removal_threshold = policy.removal_threshold,
            "Registry listening"
        );

        Ok(Self {
            registry,
            local_addr,
            cancel,
            server,
            sweeper,
        })
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Handle that stops the service when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once the service has stopped, whoever cancelled it.
    pub async fn wait(self) -> Result<()> {
        let Self {
            server, sweeper, ..
        } = self;

        if let Err(e) = sweeper.await {
            error!(error = %e, "Health check task failed");
        }
        match server.await {
            Ok(result) => result?,
            Err(e) => error!(error = %e, "Registry server task failed"),
        }

        info!("Registry stopped");
        Ok(())
    }

    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.wait().await
    }
}
