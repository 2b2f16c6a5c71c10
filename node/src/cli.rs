//! # CLI Interface
//!
//! Defines the command-line argument structure for `timelock-node` using
//! `clap` derive. Supports three subcommands: `run`, `status` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use timelock_protocol::config::{
    LedgerParams, DEFAULT_EARLY_EXIT_PENALTY_BPS, DEFAULT_EMERGENCY_PENALTY_BPS,
    DEFAULT_MAX_LOCK_PERIOD, DEFAULT_METRICS_PORT, DEFAULT_MIN_LOCK_PERIOD, DEFAULT_RPC_PORT,
    DEFAULT_RPC_URL,
};

use crate::logging::LogFormat;

/// Time-locked vault node.
///
/// Hosts one vault ledger, journals every accepted operation to disk,
/// serves the JSON-RPC API and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "timelock-node",
    about = "Time-locked deposit vault node",
    version,
    propagate_version = true
)]
pub struct TimelockNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Query the status of a running node via its RPC endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the operation journal.
    ///
    /// Created on first run if it does not exist. Ignored with `--in-memory`.
    #[arg(long, short = 'd', env = "TIMELOCK_DATA_DIR", default_value = ".timelock")]
    pub data_dir: PathBuf,

    /// Keep the journal in a temporary store that is discarded on exit.
    #[arg(long, env = "TIMELOCK_IN_MEMORY")]
    pub in_memory: bool,

    /// Port for the JSON-RPC and REST API.
    #[arg(long, env = "TIMELOCK_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TIMELOCK_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Interface to bind both listeners on.
    #[arg(long, env = "TIMELOCK_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Run on a manual clock that only moves through `dev_advanceTime`.
    ///
    /// Intended for demos and local testing. Never enable on a shared node.
    #[arg(long, env = "TIMELOCK_DEV_CLOCK")]
    pub dev_clock: bool,

    /// Shortest accepted lock period, in seconds.
    #[arg(long, env = "TIMELOCK_MIN_LOCK_PERIOD", default_value_t = DEFAULT_MIN_LOCK_PERIOD)]
    pub min_lock_period: u64,

    /// Longest accepted lock period, in seconds.
    #[arg(long, env = "TIMELOCK_MAX_LOCK_PERIOD", default_value_t = DEFAULT_MAX_LOCK_PERIOD)]
    pub max_lock_period: u64,

    /// Penalty on early emergency exits in normal mode, in basis points.
    #[arg(
        long,
        env = "TIMELOCK_EARLY_EXIT_PENALTY_BPS",
        default_value_t = DEFAULT_EARLY_EXIT_PENALTY_BPS
    )]
    pub early_exit_penalty_bps: u16,

    /// Penalty on emergency withdrawals once emergency mode is active, in basis points.
    #[arg(
        long,
        env = "TIMELOCK_EMERGENCY_PENALTY_BPS",
        default_value_t = DEFAULT_EMERGENCY_PENALTY_BPS
    )]
    pub emergency_penalty_bps: u16,

    /// How long settled receipts stay queryable, in seconds.
    #[arg(long, env = "TIMELOCK_RECEIPT_RETENTION_SECS", default_value_t = 3_600)]
    pub receipt_retention_secs: u64,

    /// Log output format.
    #[arg(long, env = "TIMELOCK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl RunArgs {
    /// Ledger rules assembled from the override flags.
    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            min_lock_period: self.min_lock_period,
            max_lock_period: self.max_lock_period,
            early_exit_penalty_bps: self.early_exit_penalty_bps,
            emergency_penalty_bps: self.emergency_penalty_bps,
        }
    }
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// RPC endpoint of the running node.
    #[arg(long, env = "TIMELOCK_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        TimelockNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults_match_ledger_defaults() {
        let cli = TimelockNodeCli::parse_from(["timelock-node", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.ledger_params(), LedgerParams::default());
        assert_eq!(args.rpc_port, DEFAULT_RPC_PORT);
        assert!(!args.dev_clock);
        assert_eq!(args.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_parsed() {
        let cli = TimelockNodeCli::parse_from([
            "timelock-node",
            "run",
            "--dev-clock",
            "--min-lock-period",
            "60",
            "--emergency-penalty-bps",
            "500",
            "--log-format",
            "json",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let params = args.ledger_params();
        assert!(args.dev_clock);
        assert_eq!(params.min_lock_period, 60);
        assert_eq!(params.emergency_penalty_bps, 500);
        assert_eq!(args.log_format, LogFormat::Json);
    }
}
