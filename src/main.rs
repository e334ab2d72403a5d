//! browsergrid - Control plane for ephemeral remote-browser sessions
//!
//! Main entry point for the browsergrid CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use browsergrid_auth::{CredentialService, SecretProvider, StaticSecretStore};
use browsergrid_bus::InMemoryBus;
use browsergrid_config::{Config, ConfigLoader, SchedulerBackendKind, StoreBackendKind};
use browsergrid_core::CreateSessionOptions;
use browsergrid_orchestrator::{OrchestratorConfig, SessionOrchestrator};
use browsergrid_store::{FileSessionStore, MemorySessionStore, SessionStore};
use browsergrid_tasks::{
    HttpSchedulerBackend, HttpSchedulerConfig, LocalBackendConfig, LocalProcessBackend,
    TaskBackend,
};

/// browsergrid CLI.
#[derive(Parser)]
#[command(name = "browsergrid")]
#[command(about = "Control plane for ephemeral remote-browser sessions")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/browsergrid.toml", global = true)]
    config: PathBuf,

    /// Directory for rolling log files (console-only when unset)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision one session and hold it until Ctrl+C (development loop)
    Run {
        /// Project that owns the session
        #[arg(long, default_value = "local-dev")]
        project: String,

        /// Seconds to wait for the session to become ready
        #[arg(long, default_value_t = 60)]
        ready_timeout: u64,
    },

    /// Load and validate the configuration, then exit
    ValidateConfig,
}

fn init_tracing(log_dir: Option<&PathBuf>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("browsergrid")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the worker guard alive for the program duration.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            registry
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if path.exists() {
        ConfigLoader::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        info!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

fn build_store(config: &Config) -> Arc<dyn SessionStore> {
    match config.store.backend {
        StoreBackendKind::Memory => Arc::new(MemorySessionStore::new()),
        StoreBackendKind::File => {
            Arc::new(FileSessionStore::new(PathBuf::from(&config.store.table)))
        }
    }
}

fn build_task_backend(config: &Config) -> Arc<dyn TaskBackend> {
    match config.scheduler.backend {
        SchedulerBackendKind::Local => Arc::new(LocalProcessBackend::new(LocalBackendConfig {
            command: config.scheduler.local_command.clone(),
            args: config.scheduler.local_args.clone(),
            port_start: config.scheduler.local_port_start,
        })),
        SchedulerBackendKind::Http => Arc::new(HttpSchedulerBackend::new(HttpSchedulerConfig {
            base_url: config.scheduler.base_url.clone(),
            cluster: config.scheduler.cluster.clone(),
            task_template: config.scheduler.task_template.clone(),
        })),
    }
}

fn build_credentials(config: &Config) -> anyhow::Result<Arc<CredentialService>> {
    // The CLI only wires the operator override; the production secret
    // store lives behind the deployment's own client.
    if config.auth.secret_override.is_empty() {
        bail!("set auth.secret_override in the config for local runs");
    }
    let secrets = SecretProvider::new(
        Box::new(StaticSecretStore::new(config.auth.secret_override.clone())),
        config.auth.secret_id.clone(),
    );
    Ok(Arc::new(CredentialService::new(
        secrets,
        config.auth.cdp_port,
    )))
}

async fn run_session(config: Config, project: String, ready_timeout: u64) -> anyhow::Result<()> {
    let orchestrator = SessionOrchestrator::new(
        build_store(&config),
        Arc::new(InMemoryBus::new()),
        build_task_backend(&config),
        build_credentials(&config)?,
        OrchestratorConfig {
            record_ttl: (config.store.record_ttl_secs > 0)
                .then(|| std::time::Duration::from_secs(config.store.record_ttl_secs)),
            resolve_timeout: std::time::Duration::from_secs(config.session.resolve_timeout_secs),
        },
    );

    let session = orchestrator
        .create_session(&project, CreateSessionOptions::default())
        .await?;
    info!(session_id = %session.id, "created session");

    orchestrator.request_provisioning(&session.id).await?;

    let cancel = CancellationToken::new();
    let resolver = orchestrator.resolve_and_mark_ready(&session.id);
    let waiter = orchestrator.wait_until_ready(
        &session.id,
        std::time::Duration::from_secs(ready_timeout),
        &cancel,
    );

    let (resolved, ready) = tokio::join!(resolver, waiter);
    resolved?;
    let ready = ready?;

    println!(
        "session {} ready\nconnect URL: {}",
        ready.id,
        ready.connect_url.as_deref().unwrap_or_default()
    );
    println!("press Ctrl+C to terminate");

    tokio::signal::ctrl_c().await?;
    match orchestrator.terminate(&session.id, "operator shutdown").await {
        Ok(stopped) => info!(session_id = %stopped.id, "session terminated"),
        Err(err) => warn!(error = %err, "terminate failed"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_dir.as_ref())?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            project,
            ready_timeout,
        } => run_session(config, project, ready_timeout).await,
        Commands::ValidateConfig => {
            config.validate()?;
            println!("configuration OK");
            Ok(())
        }
    }
}
