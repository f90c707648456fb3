//! tagpost-node: capture, queue and deliver card presentations.

use std::path::PathBuf;
use std::process::{ExitCode, ExitStatus};

use anyhow::Context;
use clap::Parser;
use tagpost_network::{Deliverer, DelivererConfig, DiscoveryListener};
use tagpost_node::{
    ControlLoop, DEFAULT_CONFIG_PATH, LocalIdentity, LoopSettings, NodeConfig, PanelDisplay,
    ReaderChild, TextPanel,
};
use tagpost_storage::FileQueue;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tagpost-node", version, about = "Card scan edge node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "TAGPOST_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // stdout belongs to the status panel
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(status) => match status.code() {
            Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
            None => {
                error!(status = %status, "Reader terminated by signal");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(error = %format!("{e:#}"), "Node failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitStatus> {
    let config = NodeConfig::load(&args.config).await?;
    info!(
        device = %config.device_name,
        queue = %config.queue_dir().display(),
        port = config.discovery_port,
        "Starting tagpost node"
    );

    let queue = FileQueue::open(config.queue_dir()).context("opening event queue")?;
    let deliverer = Deliverer::new(DelivererConfig {
        timeout: config.delivery_timeout(),
    })?;
    let discovery = DiscoveryListener::bind(config.discovery_port)
        .await
        .context("binding discovery port")?;
    let identity = LocalIdentity::new(config.location.clone(), config.location_file.clone());
    let display = PanelDisplay::new(TextPanel::new(config.panel_width), std::io::stdout());
    let reader = ReaderChild::from_config(&config)?;

    let mut node = ControlLoop::new(
        LoopSettings::from(&config),
        queue,
        deliverer,
        discovery,
        identity,
        display,
        reader,
    );
    Ok(node.run().await?)
}
