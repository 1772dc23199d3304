//! orchestratord — multi-agent orchestrator daemon.
//!
//! Usage:
//!   orchestratord                 → start the gateway (HTTP + supervisor loops)
//!   orchestratord mcp-stdio        → run as a stdio tool-server subprocess
//!   orchestratord version          → show version

use std::sync::Arc;

use clap::{Parser, Subcommand};
use orc_broker::daemon_client::{InProcessDaemon, RemoteDaemon, SharedStateDaemon};
use orc_core::config::{resolve_auth_key, OrchestratorConfig};
use orc_mux::tmux::Tmux;
use orc_registry::registry::InstanceRegistry;
use orc_supervisor::audit::AuditLog;
use orc_supervisor::daemon_health::DaemonHealthSupervisor;
use orc_supervisor::instance_health::{run_resource_sweep, run_usage_enrichment_sweep};
use orc_supervisor::summary::run_summary_sweep;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "orchestratord",
    about = "Multi-agent orchestrator: spawns and supervises Claude/Codex CLI instances in terminal-multiplexer panes",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Bind host override
    #[arg(long)]
    bind_host: Option<String>,

    /// Bind port override
    #[arg(long)]
    bind_port: Option<u16>,

    /// Disable authentication (local/dev use only)
    #[arg(long, default_value_t = false)]
    no_auth: bool,

    /// Daemon health check interval, in seconds
    #[arg(long, default_value_t = 15)]
    daemon_check_interval_secs: u64,

    /// Resource-limit sweep interval, in seconds
    #[arg(long, default_value_t = 30)]
    resource_sweep_interval_secs: u64,

    /// Usage-log enrichment sweep interval, in seconds
    #[arg(long, default_value_t = 20)]
    usage_sweep_interval_secs: u64,

    /// Activity-summary render interval, in seconds
    #[arg(long, default_value_t = 60)]
    summary_sweep_interval_secs: u64,

    /// Parse config and print the resolved settings without starting the gateway
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a stdio tool-server subprocess (spawned automatically by `self`-server wiring)
    McpStdio,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("orchestratord v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(Commands::McpStdio) => {
            init_tracing();
            let config = load_config(&cli)?;
            let state = build_state(&config, &cli).await?;
            orc_gateway::stdio::serve(state).await;
            return Ok(());
        }
        None => {}
    }

    init_tracing();
    let config = load_config(&cli)?;

    if cli.dry_run {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let state = build_state(&config, &cli).await?;

    let daemon_health = DaemonHealthSupervisor::new(state.daemon.clone(), state.registry.clone(), state.audit.clone());
    let health_cancel = tokio_util::sync::CancellationToken::new();
    let sweep_cancel = health_cancel.clone();
    let usage_cancel = health_cancel.clone();
    let summary_cancel = health_cancel.clone();

    let health_registry = state.registry.clone();
    let health_tmux = state.tmux;
    let health_audit = state.audit.clone();
    let health_daemon = state.daemon.clone();
    let daemon_check_interval = std::time::Duration::from_secs(cli.daemon_check_interval_secs);
    let resource_sweep_interval = std::time::Duration::from_secs(cli.resource_sweep_interval_secs);

    let usage_registry = state.registry.clone();
    let position_store_path = format!("{}/positions.json", state.config.log_dir);
    let usage_sweep_interval = std::time::Duration::from_secs(cli.usage_sweep_interval_secs);

    let summary_registry = state.registry.clone();
    let summary_tmux = state.tmux;
    let summary_path = format!("{}/activity_summary.md", state.config.log_dir);
    let summary_sweep_interval = std::time::Duration::from_secs(cli.summary_sweep_interval_secs);

    let artifacts_dir = state.config.artifacts_dir.clone();
    let preserve_artifacts = state.config.preserve_artifacts;

    tokio::spawn(async move {
        daemon_health
            .run(daemon_check_interval, std::time::Duration::from_secs(5), health_cancel)
            .await;
    });
    tokio::spawn(async move {
        run_resource_sweep(
            health_registry,
            health_tmux,
            health_daemon,
            health_audit,
            artifacts_dir,
            preserve_artifacts,
            resource_sweep_interval,
            sweep_cancel,
        )
        .await;
    });
    tokio::spawn(async move {
        run_usage_enrichment_sweep(usage_registry, position_store_path, usage_sweep_interval, usage_cancel).await;
    });
    tokio::spawn(async move {
        run_summary_sweep(summary_registry, summary_tmux, summary_path, summary_sweep_interval, summary_cancel).await;
    });

    let bind_host = cli.bind_host.clone().unwrap_or_else(|| config.bind_host.clone());
    let bind_port = cli.bind_port.unwrap_or(config.bind_port);
    orc_gateway::http::serve(state, &bind_host, bind_port).await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orchestratord=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<OrchestratorConfig> {
    Ok(OrchestratorConfig::load(cli.config.as_deref())?)
}

async fn build_state(config: &OrchestratorConfig, cli: &Cli) -> anyhow::Result<Arc<orc_gateway::AppState>> {
    std::fs::create_dir_all(&config.workspace_base_dir)?;
    std::fs::create_dir_all(&config.artifacts_dir)?;
    std::fs::create_dir_all(&config.log_dir)?;

    if orc_core::config::resolve_anthropic_api_key().is_none() {
        tracing::warn!("ANTHROPIC_API_KEY is not set; spawned Claude panes will inherit no key from this process");
    }

    let registry = Arc::new(InstanceRegistry::new());
    let tmux = Tmux::new();
    let audit = Arc::new(AuditLog::new(config.audit_ring_capacity));

    let auth_token = if cli.no_auth { None } else { resolve_auth_key() };
    let auth = orc_gateway::auth::GatewayAuth::new(auth_token);

    let daemon: Arc<dyn SharedStateDaemon> = if config.daemon.transport == "tcp" && std::env::var("ORC_NO_DAEMON").is_err() {
        Arc::new(RemoteDaemon::new(&config.daemon.host, config.daemon.port))
    } else {
        Arc::new(InProcessDaemon::new())
    };
    let daemon = Arc::new(RwLock::new(daemon));

    let gateway_url = format!("http://{}:{}/rpc", config.bind_host, config.bind_port);
    let prompts_dir = std::env::var("ORCHESTRATORD_PROMPTS_DIR").unwrap_or_else(|_| "resources/prompts".to_string());
    let templates_dir = std::env::var("ORCHESTRATORD_TEMPLATES_DIR").unwrap_or_else(|_| "resources/teams".to_string());

    Ok(Arc::new(orc_gateway::AppState::new(
        registry,
        tmux,
        daemon,
        audit,
        auth,
        config.clone(),
        prompts_dir,
        templates_dir,
        gateway_url,
    )))
}
