//! relaynode - host-to-relay bridge
//!
//! Connects a host world to a relay server and serves relay requests
//! until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use relaynode::host::WorldSeed;
use relaynode::{ConnectionEvent, MemoryHost, RelayConfig, RelayModule};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "relaynode")]
#[command(about = "Bridge a host world to a relay server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "relaynode.json")]
        config: PathBuf,

        /// Override the relay URL
        #[arg(long)]
        relay_url: Option<String>,

        /// Override the API key
        #[arg(long, env = "RELAY_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "relaynode.json")]
        output: PathBuf,

        /// Relay URL
        #[arg(long, default_value = "ws://localhost:3010")]
        relay_url: String,
    },

    /// Validate a config file
    CheckConfig {
        /// Path to config file
        #[arg(short, long, default_value = "relaynode.json")]
        config: PathBuf,
    },

    /// Show the identity this node presents to the relay
    ClientInfo {
        /// Path to config file
        #[arg(short, long, default_value = "relaynode.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            relay_url,
            api_key,
        } => {
            let mut config = read_config(&config)?;
            if let Some(url) = relay_url {
                config.relay_url = url;
            }
            if let Some(key) = api_key {
                config.api_key = key;
            }
            config.validate()?;
            init_tracing(&config)?;
            run(config).await?;
        }

        Commands::InitConfig { output, relay_url } => {
            init_config(&output, relay_url)?;
        }

        Commands::CheckConfig { config } => {
            let config = RelayConfig::load(&config)?;
            println!("config OK: relay {}", config.relay_endpoint());
        }

        Commands::ClientInfo { config } => {
            let config = RelayConfig::load(&config)?;
            let module = RelayModule::new(&config, build_host(&config)?);
            println!("{}", serde_json::to_string_pretty(&module.client_info())?);
        }
    }

    Ok(())
}

/// Load without validating, so CLI overrides can fill gaps first.
fn read_config(path: &Path) -> anyhow::Result<RelayConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

fn init_tracing(config: &RelayConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_directive()))?;
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    Ok(())
}

fn build_host(config: &RelayConfig) -> anyhow::Result<Arc<MemoryHost>> {
    let seed = match &config.world_file {
        Some(path) => WorldSeed::load(path)?,
        None => WorldSeed::default(),
    };
    Ok(Arc::new(MemoryHost::from_seed(seed)?))
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    info!(relay = %config.relay_endpoint(), "starting relaynode");

    let module = RelayModule::new(&config, build_host(&config)?);
    let mut events = module.manager().subscribe();
    module.start();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::AuthRejected { reason }) => {
                    eprintln!("relaynode: relay rejected the API key: {reason}");
                }
                Ok(ConnectionEvent::Failed { attempts, last_error }) => {
                    eprintln!(
                        "relaynode: giving up after {attempts} attempts ({last_error}); restart to try again"
                    );
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "connection events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    module.stop().await;
    Ok(())
}

fn init_config(output: &Path, relay_url: String) -> anyhow::Result<()> {
    let config = RelayConfig {
        relay_url,
        api_key: "changeme".to_string(),
        ..RelayConfig::default()
    };
    config.save(output)?;
    println!("wrote config to {}", output.display());
    Ok(())
}
