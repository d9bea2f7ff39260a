use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use steward_core::{
    create_authenticator, create_notifier, load_config, validate_config, ActivityLog,
    AdapterRegistry, Authenticator, Coordinator, MonitoringLoop, RunStore, SqliteActivityLog,
    SqliteRunStore,
};
use steward_server::cli::{exit_code, ApiClient, ApiReply};
use steward_server::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "steward", version, about = "Multi-domain governance orchestration coordinator")]
struct Cli {
    /// Configuration file used by `serve`
    #[arg(long, env = "STEWARD_CONFIG", default_value = "steward.toml", global = true)]
    config: PathBuf,

    /// Base URL of a running coordinator, used by the client commands
    #[arg(long, env = "STEWARD_URL", default_value = "http://127.0.0.1:8080", global = true)]
    server: String,

    /// API key sent as a bearer token by the client commands
    #[arg(long, env = "STEWARD_API_KEY", global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the coordinator, its monitoring loop and the HTTP API (default)
    Serve,
    /// Start a manual run for a workspace
    StartRun {
        workspace: String,
        /// Return as soon as the run is accepted
        #[arg(long)]
        no_wait: bool,
    },
    /// Show a run's status and per-group breakdown
    GetRunStatus { run_id: String },
    /// Cancel an in-flight run
    CancelRun { run_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so client commands keep stdout for JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match cli.command {
        None | Some(Command::Serve) => match serve(&cli.config).await {
            Ok(()) => exit_code::SUCCESS,
            Err(e) => {
                error!("Fatal error: {:#}", e);
                exit_code::ERROR
            }
        },
        Some(command) => {
            let client = ApiClient::new(&cli.server, cli.api_key.clone());
            match run_client(&client, command).await {
                Ok(reply) => {
                    print_reply(&reply);
                    reply.exit_code()
                }
                Err(e) => {
                    eprintln!("error: {:#}", e);
                    exit_code::ERROR
                }
            }
        }
    };

    std::process::exit(code);
}

async fn run_client(client: &ApiClient, command: Command) -> Result<ApiReply> {
    match command {
        Command::StartRun { workspace, no_wait } => client.start_run(&workspace, !no_wait).await,
        Command::GetRunStatus { run_id } => client.get_run_status(&run_id).await,
        Command::CancelRun { run_id } => client.cancel_run(&run_id).await,
        Command::Serve => anyhow::bail!("serve is not a client command"),
    }
}

fn print_reply(reply: &ApiReply) {
    match serde_json::to_string_pretty(&reply.body) {
        Ok(body) => println!("{}", body),
        Err(_) => println!("{}", reply.body),
    }
    if reply.exit_code() != exit_code::SUCCESS {
        eprintln!("HTTP {}", reply.status);
    }
}

async fn serve(config_path: &Path) -> Result<()> {
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Run snapshots and the activity log share one database file
    let runs: Arc<dyn RunStore> = Arc::new(
        SqliteRunStore::new(&config.database.path).context("Failed to create run store")?,
    );
    let activity: Arc<dyn ActivityLog> = Arc::new(
        SqliteActivityLog::new(&config.database.path)
            .context("Failed to create activity log")?,
    );
    info!("Run store and activity log initialized");

    let registry = Arc::new(
        AdapterRegistry::from_config(&config.groups).context("Failed to register groups")?,
    );
    info!(groups = ?registry.group_ids(), "Group adapters registered");

    let notifier = create_notifier(&config.notifier).context("Failed to create notifier")?;
    info!("Using notifier: {}", notifier.name());

    let coordinator = Arc::new(
        Coordinator::new(
            &config.workspaces,
            &config.coordinator,
            registry,
            runs,
            activity,
        )
        .context("Failed to build coordinator")?
        .with_notifier(Arc::clone(&notifier)),
    );

    // Recovered runs feed the monitor windows too.
    let monitor = Arc::new(MonitoringLoop::new(
        Arc::clone(&coordinator),
        notifier,
        config.monitor.clone(),
    ));

    let recovered = coordinator
        .recover()
        .await
        .context("Failed to recover unfinished runs")?;
    if !recovered.is_empty() {
        warn!(
            recovered = recovered.len(),
            "Closed out runs left unfinished by a previous process"
        );
        monitor.record_runs(&recovered).await;
    }

    if config.monitor.enabled {
        monitor.start();
        info!("Monitoring loop started");
    } else {
        info!("Monitoring loop disabled in config");
    }

    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        coordinator,
        Arc::clone(&monitor),
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if monitor.is_running() {
        info!("Stopping monitoring loop...");
        monitor.stop().await;
        info!("Monitoring loop stopped");
    }

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
