//! # CLI Interface
//!
//! Command-line arguments for `index-vault-node`, built with `clap` derive.
//! Flags override the matching values from the TOML config file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Index vault settlement node.
///
/// Hosts the valuation and settlement engine behind a REST API, persists
/// vault state to disk and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "index-vault-node",
    about = "Index vault settlement node",
    version,
    propagate_version = true
)]
pub struct VaultNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Write a devnet config file and create the data directory.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    ///
    /// Without it the node starts with an empty registry and no vaults.
    #[arg(long, short = 'c', env = "VAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory for the vault database.
    #[arg(long, short = 'd', env = "VAULT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the REST API.
    #[arg(long, env = "VAULT_API_PORT")]
    pub api_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VAULT_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "VAULT_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize. The config file is written inside it.
    #[arg(long, short = 'd', env = "VAULT_DATA_DIR", default_value = "./vault-data")]
    pub data_dir: PathBuf,

    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        VaultNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = VaultNodeCli::parse_from([
            "index-vault-node",
            "run",
            "--config",
            "node.toml",
            "--api-port",
            "8080",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("node.toml")));
                assert_eq!(args.api_port, Some(8080));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
