//! Bridge Relayer
//!
//! Runs one bridge instance per configured chain, each in its own task, and
//! carries messages between them. Configured transfers are submitted on a
//! fresh start; once the relay is idle every chain is audited for escrow
//! backing and every transfer for value conservation.
//!
//! # Configuration
//!
//! Read from `BRIDGE_CONFIG` (default `relayer.toml`), with
//! `BRIDGE__SECTION__KEY` environment overrides. Set `relayer.state_dir` to
//! snapshot instances on exit and resume from them on the next start.

mod audit;
mod chain;
mod config;
mod network;
mod relay;
mod store;

use config::Config;
use network::RelayNetwork;
use relay::Relayer;
use tokio::sync::mpsc;
use tracing::info;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting bridge relayer");

    let config = Config::load()?;
    info!(
        chains = config.chains.len(),
        transfers = config.transfers.len(),
        delivery_delay_ms = config.relayer.delivery_delay_ms,
        "Configuration loaded"
    );

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let network = RelayNetwork::start(&config, outbox_tx).await?;
    let mut relayer = Relayer::new(network.handles(), outbox_rx, &config.relayer);

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    network.resume().await?;
    relayer.run_until_idle(&mut shutdown_rx).await?;

    // Each transfer is relayed to rest before the next, so later ones can
    // spend what earlier ones delivered
    let mut sends = Vec::new();
    if network.is_resumed() {
        info!("Resumed from snapshots, configured transfers already submitted");
    } else {
        for (index, transfer) in config.transfers.iter().enumerate() {
            if relayer.is_stopped() {
                break;
            }
            sends.extend(network.submit(index, transfer).await?);
            relayer.run_until_idle(&mut shutdown_rx).await?;
        }
    }
    let stats = relayer.stats();
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        duplicates = stats.duplicates,
        dead_letters = stats.dead_letters.len(),
        "Relay finished"
    );

    let states = network.states().await?;
    let summary = audit::audit(&states, &sends)?;
    for (chain_id, amount) in &summary.released {
        info!(chain_id = %chain_id, released = %amount, "Released to recipients");
    }
    for (chain_id, amount) in &summary.fees {
        info!(chain_id = %chain_id, fees = %amount, "Fees collected");
    }
    info!(
        transfers = summary.transfers,
        settled = summary.settled,
        failed = summary.failed,
        in_flight = summary.in_flight,
        "Audit passed"
    );

    network.persist().await?;

    info!("Bridge relayer stopped");
    Ok(())
}

/// Initialize tracing/logging; `LOG_FORMAT=json` switches to JSON lines
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_relayer=debug"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
