mod http;
mod server;
mod websocket;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use huddle_core::{logging, Config};
use huddle_sfu::{EngineConfig, LocalMediaEngine, MediaEngine, SessionCoordinator, SfuConfig};

use server::HuddleServer;

#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Room signaling and session coordination for a selective forwarding unit", long_about = None)]
struct Args {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, env = "HUDDLE_CONFIG_PATH")]
    config: Option<String>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Huddle signaling server starting...");
    info!("HTTP address: {}", config.http_address());

    // 4. Start the media engine and the coordinator
    let engine: Arc<dyn MediaEngine> = Arc::new(LocalMediaEngine::new(EngineConfig::try_from(&config.media)?));
    let coordinator = Arc::new(SessionCoordinator::new(engine, SfuConfig::from(&config.rooms)));

    // 5. Serve until shutdown
    HuddleServer::new(config, coordinator).start().await
}
