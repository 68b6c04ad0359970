//! Isohost Server binary
//!
//! Starts one isolated host from configuration, serves until Ctrl-C, then
//! stops it and drops its catalog.

use clap::Parser;
use isohost_server::{Host, HostBuilder, IsolatedHost, IsolationSettings, ServerConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Isohost Server CLI arguments
#[derive(Parser, Debug)]
#[command(name = "isohost-server")]
#[command(about = "Isolated integration-test host", long_about = None)]
struct Args {
    /// Configuration file (TOML); `ISOHOST_*` variables override it
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Enable verbose logging (prints debug information to stdout/stderr)
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("isohost-worker")
        .enable_all()
        .build()?;

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "isohost_server=debug,isohost_core=debug,tower_http=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "isohost_server=info,isohost_core=warn,tower_http=error".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    rt.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?
            .with_overrides(|name| std::env::var(name).ok())?,
        None => ServerConfig::from_env()?,
    };
    std::fs::create_dir_all(&config.engine.address)?;

    let settings = IsolationSettings::from_config(&config);
    let shutdown_timeout = config.shutdown_timeout();
    let mut host = IsolatedHost::start_new(HostBuilder::new(config), settings).await?;

    info!("Catalog: {}", host.catalog_name());
    info!("Connection string: {}", host.connection_string());
    if let Some(url) = host.base_url() {
        info!("Serving on {}", url);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(shutdown_timeout).await;
        timer.cancel();
    });
    if let Err(e) = host.stop(cancel).await {
        warn!("Stop failed: {}", e);
    }

    let report = host.dispose();
    for err in &report.teardown_errors {
        warn!("Teardown error: {}", err);
    }
    Ok(())
}
