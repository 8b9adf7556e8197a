//! Helmsman - conversational cluster operations
//!
//! A line-oriented REPL over the orchestrator:
//! - Read-only requests run immediately
//! - Changes are listed and wait for `confirm` / `cancel`
//! - `--offline` plans every turn with the keyword planner

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use helmsman_core::agent::{
    LoggingHook, Orchestrator, ProtectedNamespaceHook, ReadOnlyHook, ResultFormatter,
};
use helmsman_core::ai::{HttpOracle, OfflineOracle, Oracle};
use helmsman_core::cluster::InMemoryCluster;
use helmsman_core::constants::ui;
use helmsman_core::plan::PlannerAdapter;
use helmsman_core::tools::ToolDispatcher;
use helmsman_core::{paths, HelmsmanConfig, SessionKey};

mod repl;

/// Helmsman - cluster operations with a confirmation gate
#[derive(Parser)]
#[command(name = "helmsman")]
#[command(about = "Conversational cluster operations with a confirmation gate", long_about = None)]
struct Cli {
    /// Session key (defaults to the current directory name)
    #[arg(short, long)]
    session: Option<String>,

    /// Config file (defaults to ~/.helmsman/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default namespace for requests that name none
    #[arg(short, long)]
    namespace: Option<String>,

    /// Plan with the keyword planner only; never call a model
    #[arg(long)]
    offline: bool,

    /// Refuse every mutating operation
    #[arg(long)]
    read_only: bool,

    /// Print turn events as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Log to stderr instead of the log file
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = HelmsmanConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => HelmsmanConfig::load()?,
    };
    if let Some(namespace) = &cli.namespace {
        config.cluster.default_namespace = namespace.clone();
    }
    config.oracle.offline |= cli.offline;
    config.agent.read_only |= cli.read_only;

    let oracle: Arc<dyn Oracle> = if config.oracle.offline || config.oracle.api_key.is_none() {
        if !config.oracle.offline {
            tracing::warn!("No API key configured, running offline");
        }
        Arc::new(OfflineOracle)
    } else {
        Arc::new(HttpOracle::new(config.http_oracle_config()))
    };
    tracing::info!(
        oracle = oracle.name(),
        read_only = config.agent.read_only,
        "Starting helmsman"
    );

    let mut namespaces = config.cluster.seed_namespaces.clone();
    namespaces.push(config.cluster.default_namespace.clone());
    namespaces.extend(config.cluster.allowed_namespaces.iter().cloned());
    let cluster = Arc::new(InMemoryCluster::with_namespaces(namespaces));

    let dispatcher = ToolDispatcher::new(cluster)
        .with_pre_hook(Arc::new(ReadOnlyHook::new(config.agent.read_only)))
        .with_pre_hook(Arc::new(ProtectedNamespaceHook::new()))
        .with_post_hook(Arc::new(LoggingHook::new()));

    let orchestrator = Arc::new(Orchestrator::new(
        PlannerAdapter::new(oracle.clone()),
        dispatcher,
        ResultFormatter::new(oracle),
        config.orchestrator_config(),
    ));

    let session = cli.session.map(SessionKey::from).unwrap_or_else(default_session);
    repl::run(orchestrator, config.planning_context(), session, cli.json).await
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    let log_dir = paths::ensure_logs_dir().context("failed to create log directory")?;
    let log_file = std::fs::File::create(log_dir.join(ui::LOG_FILE_NAME))
        .context("failed to create log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn default_session() -> SessionKey {
    std::env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|name| name.to_string_lossy().into_owned()))
        .map(SessionKey::from)
        .unwrap_or_else(|| SessionKey::from("default"))
}
