// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Timelock Vault Node
//!
//! Entry point for the `timelock-node` binary. Parses CLI arguments,
//! initializes logging and metrics, rebuilds the ledger from its journal,
//! and serves the HTTP/WS API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     - start the node
//! - `status`  - query a running node's status endpoint
//! - `version` - print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;

use timelock_protocol::config::PROTOCOL_VERSION;
use timelock_protocol::rpc::RpcHandler;
use timelock_protocol::storage::JournalStore;
use timelock_protocol::{ManualClock, SharedClock, SystemClock, VaultLedger, VaultService};

use cli::{Commands, TimelockNodeCli};
use metrics::VaultMetrics;

/// How often settled receipts older than the retention window are evicted.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TimelockNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: journal replay, submission service, API server and
/// metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(args.log_format);

    let params = args.ledger_params();
    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        in_memory = args.in_memory,
        dev_clock = args.dev_clock,
        min_lock_period = params.min_lock_period,
        max_lock_period = params.max_lock_period,
        "starting timelock-node"
    );

    // --- Journal ---
    let store = if args.in_memory {
        JournalStore::open_temporary().context("failed to open temporary journal")?
    } else {
        let journal_path = args.data_dir.join("journal");
        std::fs::create_dir_all(&args.data_dir).with_context(|| {
            format!("failed to create data directory: {}", args.data_dir.display())
        })?;
        JournalStore::open(&journal_path)
            .with_context(|| format!("failed to open journal at {}", journal_path.display()))?
    };

    // --- Clock ---
    let dev_clock = args.dev_clock.then(|| Arc::new(ManualClock::starting_now()));
    let clock: SharedClock = match &dev_clock {
        Some(manual) => manual.clone(),
        None => Arc::new(SystemClock),
    };

    // --- Ledger ---
    let ledger = VaultLedger::new(params, clock)
        .context("invalid ledger parameters")?
        .with_journal(Arc::new(store.clone()));
    let entries = store.load_all().context("failed to read journal")?;
    let replayed = entries.len();
    let seq = ledger
        .replay(entries)
        .context("journal replay failed; the data directory does not match these ledger parameters")?;
    ledger
        .audit()
        .context("ledger failed its consistency audit after replay")?;
    tracing::info!(
        entries = replayed,
        seq,
        bytes_on_disk = store.size_on_disk().unwrap_or(0),
        "ledger restored from journal"
    );

    // --- Service & RPC ---
    let ledger = Arc::new(ledger);
    let service = Arc::new(VaultService::new(Arc::clone(&ledger)));
    let mut rpc = RpcHandler::new(Arc::clone(&service));
    if let Some(manual) = dev_clock {
        tracing::warn!("dev clock enabled: ledger time only moves through dev_advanceTime");
        rpc = rpc.with_dev_clock(manual);
    }

    // --- Metrics ---
    let vault_metrics = Arc::new(VaultMetrics::new());
    vault_metrics.refresh(&ledger);
    let observer = spawn_receipt_observer(service.subscribe(), Arc::clone(&vault_metrics), Arc::clone(&ledger));

    // --- Receipt retention ---
    let retention = Duration::from_secs(args.receipt_retention_secs);
    let prune_service = Arc::clone(&service);
    let pruner = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = prune_service.prune_settled(retention);
            if evicted > 0 {
                tracing::debug!(evicted, lanes = prune_service.lane_count(), "pruned settled receipts");
            }
        }
    });

    // --- Application state ---
    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        rpc,
        metrics: Arc::clone(&vault_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&vault_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    pruner.abort();
    observer.abort();

    store
        .flush_async()
        .await
        .context("failed to flush journal on shutdown")?;
    tracing::info!(seq = ledger.seq(), "timelock-node stopped");
    Ok(())
}

/// Feeds every settled receipt into the metrics and refreshes the ledger
/// gauges after each one.
fn spawn_receipt_observer(
    mut receipts: broadcast::Receiver<timelock_protocol::Receipt>,
    metrics: Arc<VaultMetrics>,
    ledger: Arc<VaultLedger>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receipts.recv().await {
                Ok(receipt) => {
                    metrics.observe(&receipt);
                    if receipt.seq.is_some() {
                        metrics.refresh(&ledger);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("metrics observer lagged by {} receipts", n);
                    metrics.refresh(&ledger);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let status: serde_json::Value = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .error_for_status()
        .with_context(|| format!("{} returned an error status", url))?
        .json()
        .await
        .context("status response was not JSON")?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("timelock-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", PROTOCOL_VERSION);
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
