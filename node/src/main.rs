// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Index Vault Node
//!
//! Entry point for the `index-vault-node` binary. Parses CLI arguments,
//! loads the TOML config, restores vault state from disk and serves the
//! REST API next to a Prometheus endpoint.
//!
//! Subcommands:
//!
//! - `run`: start the node
//! - `init`: write a devnet config and create the data directory
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use index_vault::prelude::*;
use index_vault::VaultError;

use cli::{Commands, VaultNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VaultNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => {
            logging::init_logging("index_vault_node=info", LogFormat::Pretty);
            init_node(args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Folds CLI overrides into the loaded config.
fn resolve_config(args: &cli::RunArgs) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.node.data_dir = dir.clone();
    }
    if let Some(port) = args.api_port {
        config.node.api_port = port;
    }
    if let Some(port) = args.metrics_port {
        config.node.metrics_port = port;
    }
    if let Some(format) = &args.log_format {
        config.node.log_format = format.clone();
    }
    Ok(config)
}

/// Registers configured assets and vaults that the database does not know
/// yet, then publishes the seed prices.
fn bootstrap(service: &SettlementService, prices: &StaticPriceFeed, config: &NodeConfig) -> Result<()> {
    for descriptor in &config.assets {
        if service.is_supported(&descriptor.type_id) {
            continue;
        }
        service
            .register_asset(descriptor.clone())
            .with_context(|| format!("failed to register asset {}", descriptor.type_id))?;
    }

    for seed in &config.vaults {
        match service.create_vault(&seed.creator, &seed.name, &seed.symbol) {
            Ok(_) | Err(VaultError::DuplicateVault(_)) => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create vault {}", seed.symbol));
            }
        }
    }

    for seed in &config.prices {
        prices.publish(seed.feed_id.as_str(), seed.mantissa, seed.exponent);
    }
    Ok(())
}

/// Starts the node: storage, engine, API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let node = &config.node;
    logging::init_logging(&node.log_level, LogFormat::from_str_lossy(&node.log_format));

    tracing::info!(
        api_port = node.api_port,
        metrics_port = node.metrics_port,
        data_dir = %node.data_dir.display(),
        "starting index-vault-node"
    );

    // --- Persistent storage ---
    let db_path = node.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = VaultDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Engine ---
    let custody = Arc::new(InMemoryCustody::new());
    let service = Arc::new(
        SettlementService::restore(custody.clone(), db).context("failed to restore vault state")?,
    );
    let prices = Arc::new(if node.max_price_age_secs == 0 {
        StaticPriceFeed::new()
    } else {
        StaticPriceFeed::with_max_age(std::time::Duration::from_secs(node.max_price_age_secs))
    });
    bootstrap(&service, &prices, &config)?;

    let funded_vaults = service
        .list_vaults()
        .into_iter()
        .filter(|v| v.holder_count > 0)
        .count();
    if funded_vaults > 0 {
        tracing::warn!(
            vaults = funded_vaults,
            "restored vaults have holders but custody is in-memory; shares balances start empty"
        );
    }

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.vaults.set(service.vault_count() as i64);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (engine {})",
            env!("CARGO_PKG_VERSION"),
            index_vault::config::ENGINE_VERSION,
        ),
        service,
        prices,
        custody,
        faucet_enabled: node.faucet,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", node.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", node.metrics_port);
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

    tracing::info!("index-vault-node stopped");
    Ok(())
}

/// Creates the data directory and writes a devnet `config.toml` into it.
fn init_node(args: cli::InitArgs) -> Result<()> {
    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = data_dir.join("config.toml");
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
    }

    let mut config = NodeConfig::devnet();
    config.node.data_dir = data_dir.clone();
    std::fs::write(&config_path, config.to_toml()?)
        .with_context(|| format!("failed to write config to {}", config_path.display()))?;

    tracing::info!(config = %config_path.display(), "node initialized");

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Config file    : {}", config_path.display());
    println!("  Assets         : {}", config.assets.len());
    println!("  Vaults         : {}", config.vaults.len());

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("index-vault-node {}", env!("CARGO_PKG_VERSION"));
    println!("engine           {}", index_vault::config::ENGINE_VERSION);
    println!("rustc            {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// If a handler cannot be installed, that branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
