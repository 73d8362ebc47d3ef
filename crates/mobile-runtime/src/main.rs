//! # Mobile Station Runtime
//!
//! Runs one or more simulated GSM mobile stations.
//!
//! ## Startup Sequence
//!
//! 1. Parse the command line and install logging
//! 2. Load the configuration file (if any) and `MS_*` overrides
//! 3. Create and power on every configured station (or station `1`)
//! 4. Tick the supervisor until shutdown completes
//!
//! The first Ctrl+C detaches every station gracefully; a second one quits
//! at once.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mobile_runtime::{default_services, run_loop, AppConfig, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "mobile")]
#[command(about = "Simulated GSM mobile stations with an FBTS control channel")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Expose an external call-control socket per station
    #[arg(long)]
    mncc_socket: bool,

    /// Main-loop tick in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };
    config.apply_env();
    if let Some(ms) = args.tick_ms {
        config.tick = Duration::from_millis(ms);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args)?;
    info!(
        fbts_port = config.fbts.port,
        tick_ms = config.tick.as_millis() as u64,
        mncc_socket = args.mncc_socket,
        "Starting mobile runtime"
    );

    let quit = Arc::new(AtomicBool::new(false));
    let services = default_services(&config, Arc::clone(&quit), args.mncc_socket);
    let supervisor =
        Supervisor::init(&config, services, quit).context("Failed to start mobile stations")?;

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            supervisor.exit();
            return Err(e).context("Failed to listen for Ctrl+C");
        }
    };
    let (interrupt_tx, mut interrupts) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while interrupt.recv().await.is_some() {
            if interrupt_tx.send(()).is_err() {
                break;
            }
        }
    });

    info!("Mobile is running. Press Ctrl+C to stop.");
    run_loop::run(&supervisor, config.tick, &mut interrupts).await;

    supervisor.exit();
    info!("Mobile runtime stopped");
    Ok(())
}
