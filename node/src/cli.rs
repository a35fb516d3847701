//! # CLI Interface
//!
//! Defines the command-line argument structure for `endorse-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ENDORSE registry node.
///
/// Serves the student recommendation workflow over HTTP: registration,
/// approver authorization, recommendation requests and approvals, and
/// record lookups, backed by a durable on-disk registry.
#[derive(Parser, Debug)]
#[command(
    name = "endorse-node",
    about = "ENDORSE recommendation registry node",
    version,
    propagate_version = true
)]
pub struct EndorseNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the registry node.
    Run(RunArgs),
    /// Initialize a new registry — creates the data directory and fixes
    /// the owner identity.
    Init(InitArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory where the registry is stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "ENDORSE_DATA_DIR", default_value = "~/.endorse")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "ENDORSE_RPC_PORT", default_value_t = endorse_registry::config::DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ENDORSE_METRICS_PORT", default_value_t = endorse_registry::config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Owner identity for a freshly created registry.
    ///
    /// Required the first time a data directory is used; ignored (with a
    /// warning) when the registry already has an owner on disk.
    #[arg(long, env = "ENDORSE_OWNER")]
    pub owner: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "ENDORSE_DATA_DIR", default_value = "~/.endorse")]
    pub data_dir: PathBuf,

    /// Identity that will own the registry. Fixed for its lifetime —
    /// choose wisely, there is no transfer operation.
    #[arg(long, env = "ENDORSE_OWNER")]
    pub owner: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:8460")]
    pub rpc_url: String,
}
