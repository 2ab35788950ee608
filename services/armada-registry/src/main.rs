use anyhow::Context;
use armada_core::BUILD_INFO;
use armada_registry::{RegistryConfig, RegistryService};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "armada-registry")]
#[command(about = "Dynamic agent registry with background health checks")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "ARMADA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(flatten)]
    config: RegistryConfig,
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

    let service = RegistryService::start(&cli.config)
        .await
        .context("failed to start registry")?;
    let shutdown = service.shutdown_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    service.wait().await.context("registry terminated with an error")?;
    Ok(())
}
