use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use docgate::config;
use docgate::error::Result;
use docgate::plugin::{catalog, PluginRegistry};
use docgate::server;
use docgate::state::GatewayState;
use docgate::store::{DocumentStore, MemoryStore};

#[derive(Parser, Debug)]
#[command(name = "docgate")]
#[command(about = "A pluggable API gateway for document databases", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (YAML/JSON/TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the gateway (default)
    Run,
    /// Validate configuration and the plugin catalog without serving
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("docgate={log_level}").parse().expect("valid directive")),
        )
        .init();

    let config = match args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match config::load_from_path(&path).await {
                Ok(cfg) => cfg,
                Err(e) => {
                    error!("Failed to load configuration from {}: {}", path.display(), e);
                    return Err(e);
                }
            }
        }
        None => {
            info!("Loading configuration from default locations");
            match config::load_from_env_or_file().await {
                Ok(cfg) => cfg,
                Err(e) => {
                    error!("Failed to load configuration: {}", e);
                    return Err(e);
                }
            }
        }
    };

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let candidates = catalog::builtin(store.clone());

    let registry = match PluginRegistry::build(candidates, &config) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to build the plugin registry: {}", e);
            return Err(e.into());
        }
    };

    if matches!(args.command, Some(Command::Check)) {
        info!(
            "Configuration OK: {} initializer(s), {} service(s) registered",
            registry.initializers().len(),
            registry.services().len()
        );
        println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
        return Ok(());
    }

    // initializers run in priority order before the listener starts; a
    // failing one is skipped like a failing registration
    for record in registry.initializers() {
        if let Err(e) = record.instance().init().await {
            error!("Initializer '{}' failed: {:#}", record.name(), e);
        }
    }

    let (state, _shutdown_rx) = GatewayState::new(config, registry, store)?;

    info!(
        "Starting docgate on {}:{}",
        state.config.gateway.host, state.config.gateway.port
    );

    let shutdown_state = state.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            shutdown_state.shutdown().await;
        }
    });

    server::start_server(state).await
}
