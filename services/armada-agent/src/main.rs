use anyhow::Context;
use armada_agent::{router, AgentSettings, AgentState};
use armada_core::BUILD_INFO;
use armada_registry::RegistryClient;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "armada-agent")]
#[command(about = "Reference agent service for Armada deployments")]
#[command(version)]
struct Cli {
    #[arg(long, env = "ARMADA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(flatten)]
    settings: AgentSettings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    info!("Starting {}", BUILD_INFO);

    let state = Arc::new(AgentState::from_settings(&cli.settings)?);
    let listener = TcpListener::bind(cli.settings.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", cli.settings.bind_addr()))?;
    info!(
        agent = %state.id,
        agent_type = %state.agent_type,
        peers = state.peers.len(),
        "Agent listening on {}",
        listener.local_addr()?
    );

    let registry = cli.settings.registry_url.as_deref().map(RegistryClient::new);
    let app = router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
                info!("Shutdown signal received");
            })
            .await
    });

    if let Some(client) = &registry {
        match client.register(&state.registration()).await {
            Ok(_) => info!(registry = %client.base_url(), "Registered with registry"),
            Err(e) => warn!(registry = %client.base_url(), error = %e, "Registry registration failed"),
        }
    }

    server.await.context("agent server task failed")??;

    if let Some(client) = &registry {
        if let Err(e) = client.deregister(&state.id).await {
            warn!(error = %e, "Registry deregistration failed");
        }
    }

    info!(agent = %state.id, "Agent stopped");
    Ok(())
}
