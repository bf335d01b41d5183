//! # subpub_app — stdin relay
//!
//! Drives an in-process [`subpub::Bus`] from the terminal.
//!
//! ## Lifecycle
//!
//! 1. Load the YAML config (optional) and initialise logging on stderr.
//! 2. Subscribe a stdout forwarder for every `--subscribe` subject.
//! 3. Publish each stdin line `<subject> <payload>`.
//! 4. On EOF or a termination signal, close the bus within the configured
//!    shutdown deadline.

mod config;
mod relay;
mod signals;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use subpub::{Bus, BusError};

use crate::config::AppConfig;
use crate::relay::{Relay, RelayError};

#[derive(Debug, Parser)]
#[command(name = "subpub_app", about = "Relay stdin lines through an in-process pub/sub bus")]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subject whose messages are printed to stdout (repeatable)
    #[arg(short, long = "subscribe")]
    subscribe: Vec<String>,

    /// Override the shutdown deadline, in milliseconds
    #[arg(long)]
    shutdown_timeout_ms: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(ms) = args.shutdown_timeout_ms {
        config.shutdown.timeout = Duration::from_millis(ms);
    }

    // Initialise structured logging. Stdout carries deliveries.
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log.level)
            .with_context(|| format!("invalid log level {:?}", config.log.level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run(args.subscribe, config));
    // Handlers abandoned after a missed deadline must not hold up exit.
    runtime.shutdown_background();
    result
}

async fn run(subjects: Vec<String>, config: AppConfig) -> Result<()> {
    info!(
        queue_capacity = config.bus.queue_capacity,
        shutdown_timeout = ?config.shutdown.timeout,
        "relay starting"
    );

    let bus = Bus::with_config(config.bus_config())?;
    let mut relay = Relay::new(bus);
    for subject in &subjects {
        relay
            .subscribe(subject, std::io::stdout())
            .with_context(|| format!("failed to subscribe to {subject:?}"))?;
    }

    info!(subscriptions = relay.subscription_count(), "relay ready");

    let shutdown = signals::wait_for_shutdown_signal();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match relay.handle_line(&line) {
                    Ok(_) => {}
                    Err(RelayError::EmptySubject) => warn!(line, "ignoring line without a subject"),
                    Err(e) => return Err(e).context("failed to publish"),
                }
            }
            signal = &mut shutdown => {
                signal.context("failed to listen for shutdown signals")?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("shutting down relay");
    match relay.shutdown(config.shutdown.timeout).await {
        Ok(()) => info!("bus closed"),
        Err(BusError::DeadlineExceeded { timeout }) => {
            warn!(?timeout, "shutdown deadline exceeded, exiting with deliveries in flight");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
