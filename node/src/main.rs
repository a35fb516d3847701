// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ENDORSE Registry Node
//!
//! Entry point for the `endorse-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the on-disk registry, and serves
//! the HTTP API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the registry node
//! - `init`    — initialize a data directory and fix the registry owner
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use endorse_registry::{RegistryStore, WorkflowEngine};

use cli::{Commands, EndorseNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EndorseNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full registry node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "endorse_node=info,endorse_registry=info,tower_http=debug",
        LogFormat::Pretty,
    );

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting endorse-node"
    );

    // --- Persistent registry ---
    let db_path = args.data_dir.join("registry");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create registry directory: {}", db_path.display()))?;

    let creator = args.owner.as_deref().unwrap_or("");
    let store = Arc::new(RegistryStore::open(&db_path, creator).with_context(|| {
        format!(
            "failed to open registry at {} (a new registry needs --owner)",
            db_path.display()
        )
    })?);
    tracing::info!(path = %db_path.display(), owner = store.owner(), "registry opened");

    if let Some(requested) = args.owner.as_deref() {
        if requested != store.owner() {
            tracing::warn!(
                owner = store.owner(),
                requested,
                "registry already has an owner; --owner ignored"
            );
        }
    }

    // --- Workflow engine ---
    let engine = Arc::new(WorkflowEngine::new(Arc::clone(&store)));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.students.set(store.student_count() as i64);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

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

    store.flush().context("final registry flush failed")?;
    tracing::info!("endorse-node stopped");
    Ok(())
}

/// Initializes a new registry data directory with a fixed owner.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("endorse_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), owner = %args.owner, "initializing registry");

    let db_path = data_dir.join("registry");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create registry directory: {}", db_path.display()))?;

    let store = RegistryStore::open(&db_path, &args.owner)
        .with_context(|| format!("failed to initialize registry at {}", db_path.display()))?;

    if store.owner() != args.owner.trim() {
        tracing::warn!(
            owner = store.owner(),
            "registry already existed; ownership is fixed at creation"
        );
    }

    println!("Registry initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Owner          : {}", store.owner());
    println!("  Students       : {}", store.student_count());
    println!("  Approvers      : {}", store.approver_count());

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.rpc_url.trim_end_matches('/'));
    let body = http_get(&url).await?;
    println!("{}", body);
    Ok(())
}

/// Minimal HTTP/1.1 GET over a raw TCP stream — just enough for the
/// `status` subcommand without pulling in an HTTP client dependency.
async fn http_get(url: &str) -> Result<String> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow::anyhow!("only http:// URLs are supported, got {url}"))?;

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let addr = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };

    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, authority,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Strip HTTP headers — everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());

    Ok(body)
}

/// Prints version information to stdout.
fn print_version() {
    println!("endorse-node {}", env!("CARGO_PKG_VERSION"));
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
