// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Veilmint Node
//!
//! Entry point for the `veilmint-node` binary. Parses CLI arguments,
//! initializes logging and metrics, deploys one collection in-process and
//! serves it over HTTP/WS.
//!
//! The binary supports three subcommands:
//!
//! - `run`        — deploy a collection and serve it
//! - `commitment` — compute a metadata commitment off-line
//! - `version`    — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod rpc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use veilmint_contracts::{InMemoryLedger, Registry};
use veilmint_protocol::config::{
    COMMITMENT_HASH_FUNCTION, EVENT_CHANNEL_CAPACITY, PROTOCOL_VERSION,
};
use veilmint_protocol::crypto::{generate_secret, Commitment};
use veilmint_protocol::identity::Address;
use veilmint_protocol::time::{Clock, ManualClock, SystemClock};
use veilmint_protocol::units::format_ether;

use cli::{Commands, VeilmintCli};
use metrics::NodeMetrics;

/// Label the devnet owner address is derived from when `--owner` is omitted.
const DEVNET_OWNER_LABEL: &str = "veilmint-devnet-owner";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VeilmintCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Commitment(args) => {
            print_commitment(args);
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Deploys the collection and serves the API and metrics endpoints until a
/// shutdown signal arrives.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    let owner = match (args.owner, args.devnet) {
        (Some(owner), _) => owner,
        (None, true) => Address::derive(DEVNET_OWNER_LABEL),
        (None, false) => bail!("--owner is required outside devnet mode"),
    };
    let config = args.collection_config();

    tracing::info!(
        %owner,
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        devnet = args.devnet,
        mint_price_eth = %format_ether(config.mint_price),
        "starting veilmint-node"
    );

    // --- Clock ---
    let (clock, devnet_clock): (Arc<dyn Clock>, Option<Arc<ManualClock>>) = if args.devnet {
        let manual = Arc::new(ManualClock::starting_now());
        (manual.clone(), Some(manual))
    } else {
        (Arc::new(SystemClock::new()), None)
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let publisher = api::StreamPublisher::new(event_tx.clone(), Arc::clone(&node_metrics));

    // --- Registry ---
    // Withdrawals settle into an in-process ledger; the node has no chain
    // connection of its own.
    let registry = Registry::new(owner, &config, clock, Arc::new(InMemoryLedger::new()))
        .context("invalid collection configuration")?
        .with_event_sink(Arc::new(publisher));

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            PROTOCOL_VERSION,
        ),
        registry: Arc::new(registry),
        devnet_clock,
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };
    app_state.refresh_gauges();

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
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

    tracing::info!("veilmint-node stopped");
    Ok(())
}

/// Computes and prints a commitment for the given base URI.
fn print_commitment(args: cli::CommitmentArgs) {
    let secret = if args.generate_secret {
        generate_secret()
    } else {
        args.secret
    };
    let commitment = Commitment::compute(&secret, &args.base_uri);

    println!("Base URI   : {}", args.base_uri);
    println!("Secret     : {}", if secret.is_empty() { "(none)" } else { &secret });
    println!("Commitment : {}", commitment);
    if secret.is_empty() {
        println!();
        println!("Note: without a secret, anyone who guesses the base URI can check it");
        println!("against the published commitment before the reveal.");
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("veilmint-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", PROTOCOL_VERSION);
    println!("commitments   {}", COMMITMENT_HASH_FUNCTION);
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
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
