use anyhow::{bail, Context};
use armada_core::{resolve, DeploymentPlan, JobDefinition, JobLoader};
use armada_deployer::{
    AgentHealthReport, AgentRunner, DeployedJob, Deployer, HealthProbe, Monitor, TargetRunner,
};
use armada_registry::{RegisteredAgent, RegistryClient, SearchQuery};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "armada")]
#[command(about = "Armada CLI - Topology-aware agent deployment")]
#[command(version = armada_core::VERSION)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "ARMADA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a job file without deploying anything
    Validate {
        job: PathBuf,
        /// Do not require agent modules to be installed locally
        #[arg(long)]
        skip_module_check: bool,
    },
    /// Print the staged deployment plan as JSON
    Plan {
        job: PathBuf,
        #[arg(long)]
        skip_module_check: bool,
    },
    /// Start every agent stage by stage, waiting for each to become healthy
    Deploy {
        job: PathBuf,
        /// Keep checking agent health until interrupted
        #[arg(long)]
        monitor: bool,
        /// Seconds between monitor checks
        #[arg(long, default_value_t = 10)]
        interval: u64,
        /// Stop all agents when the command exits
        #[arg(long)]
        teardown_on_exit: bool,
    },
    /// Query a running registry
    Registry {
        #[arg(
            long,
            global = true,
            env = "ARMADA_REGISTRY_URL",
            default_value = "http://localhost:8500"
        )]
        registry_url: String,

        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand, Debug)]
enum RegistryAction {
    /// List registered agents
    List {
        #[arg(long)]
        healthy_only: bool,
    },
    /// Show one agent
    Show { id: String },
    /// Find agents by skill, tag or name
    Search {
        #[arg(long)]
        skill: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Include unhealthy agents
        #[arg(long)]
        all: bool,
    },
    /// Remove an agent
    Deregister { id: String },
    /// Registry totals
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate {
            job,
            skip_module_check,
        } => handle_validate(&job, skip_module_check),
        Commands::Plan {
            job,
            skip_module_check,
        } => handle_plan(&job, skip_module_check),
        Commands::Deploy {
            job,
            monitor,
            interval,
            teardown_on_exit,
        } => handle_deploy(&job, monitor, interval, teardown_on_exit).await,
        Commands::Registry {
            registry_url,
            action,
        } => handle_registry_action(RegistryClient::new(registry_url), action).await,
    }
}

fn load_job(path: &Path, skip_module_check: bool) -> anyhow::Result<JobDefinition> {
    let loader = if skip_module_check {
        JobLoader::without_module_check()
    } else {
        JobLoader::new()
    };
    loader
        .load_file(path)
        .with_context(|| format!("invalid job file {}", path.display()))
}

fn load_and_resolve(
    path: &Path,
    skip_module_check: bool,
) -> anyhow::Result<(JobDefinition, DeploymentPlan)> {
    let job = load_job(path, skip_module_check)?;
    let plan = resolve(&job).with_context(|| format!("cannot plan job '{}'", job.name()))?;
    Ok((job, plan))
}

fn handle_validate(path: &Path, skip_module_check: bool) -> anyhow::Result<()> {
    let (job, plan) = load_and_resolve(path, skip_module_check)?;
    println!(
        "✅ Job '{}' is valid: {} agents, {} topology, {} stages",
        job.name(),
        job.agents.len(),
        job.topology.kind(),
        plan.stages.len()
    );
    Ok(())
}

fn handle_plan(path: &Path, skip_module_check: bool) -> anyhow::Result<()> {
    let (_, plan) = load_and_resolve(path, skip_module_check)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn handle_deploy(
    path: &Path,
    monitor: bool,
    interval: u64,
    teardown_on_exit: bool,
) -> anyhow::Result<()> {
    let (job, plan) = load_and_resolve(path, false)?;
    println!(
        "🚀 Deploying '{}' in {} stages",
        job.name(),
        plan.stages.len()
    );
    for (index, stage) in plan.stages.iter().enumerate() {
        println!("   stage {}: {}", index + 1, stage.join(", "));
    }

    let runner: Arc<dyn AgentRunner> = Arc::new(TargetRunner::new());
    let deployer = Deployer::new(runner.clone());
    let deployed = deployer
        .deploy(&job, &plan)
        .await
        .with_context(|| format!("deployment of '{}' failed", job.name()))?;

    print_deployed(&deployed);

    if !monitor && !teardown_on_exit {
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            stopper.cancel();
        }
    });

    if monitor {
        println!("🩺 Monitoring every {}s, Ctrl-C to stop", interval.max(1));
        Monitor::new(HealthProbe::default(), Duration::from_secs(interval.max(1)))
            .with_runner(runner)
            .run(&deployed, cancel, print_reports)
            .await;
    } else {
        println!("⏸️  Agents running, Ctrl-C to stop them");
        cancel.cancelled().await;
    }

    if teardown_on_exit {
        println!("🛑 Stopping agents...");
        deployer.teardown(&deployed).await;
    }
    Ok(())
}

fn print_deployed(deployed: &DeployedJob) {
    println!("✅ Deployment {} complete", deployed.job_id);
    for process in deployed.processes.values() {
        let peers = deployed.plan.connections_for(&process.agent_id);
        println!(
            "   {:<20} {:<28} peers: {}",
            process.agent_id,
            process.url,
            if peers.is_empty() {
                "-".to_string()
            } else {
                peers.join(", ")
            }
        );
    }
}

fn print_reports(reports: &[AgentHealthReport]) {
    for report in reports {
        let marker = if report.is_healthy() { "🟢" } else { "🔴" };
        let process = match report.process_alive {
            Some(false) => " (process exited)",
            _ => "",
        };
        println!(
            "{} {} {} {}{}",
            report.checked_at.format("%H:%M:%S"),
            marker,
            report.agent_id,
            report.summary(),
            process
        );
    }
}

async fn handle_registry_action(client: RegistryClient, action: RegistryAction) -> anyhow::Result<()> {
    match action {
        RegistryAction::List { healthy_only } => {
            let agents = client.list(healthy_only).await?;
            print_agents(&agents);
        }
        RegistryAction::Show { id } => {
            let agent = client.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&agent)?);
        }
        RegistryAction::Search {
            skill,
            tag,
            name,
            all,
        } => {
            if skill.is_none() && tag.is_none() && name.is_none() {
                bail!("search needs at least one of --skill, --tag or --name");
            }
            let query = SearchQuery {
                skill,
                tag,
                name,
                healthy_only: !all,
            };
            print_agents(&client.search(&query).await?);
        }
        RegistryAction::Deregister { id } => {
            client.deregister(&id).await?;
            println!("🗑️  Deregistered {}", id);
        }
        RegistryAction::Status => {
            let stats = client.stats().await?;
            println!("📊 Registry at {}", client.base_url());
            println!("   total:     {}", stats.total_agents);
            println!("   healthy:   {}", stats.healthy_agents);
            println!("   unhealthy: {}", stats.unhealthy_agents);
        }
    }
    Ok(())
}

fn print_agents(agents: &[RegisteredAgent]) {
    if agents.is_empty() {
        println!("No agents found");
        return;
    }
    for agent in agents {
        println!(
            "{:<20} {:<10} {:<28} failures: {}",
            agent.id,
            agent.health_status.to_string(),
            agent.url,
            agent.consecutive_failures
        );
    }
}
