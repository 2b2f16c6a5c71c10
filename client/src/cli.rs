//! # CLI Interface
//!
//! Command-line structure of the `timelock` binary: one subcommand per vault
//! operation and read, plus `demo`.

use clap::{Parser, Subcommand, ValueEnum};

use timelock_client::Scenario;
use timelock_protocol::config::{DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_RPC_URL};
use timelock_protocol::types::Address;

/// Time-locked vault client.
#[derive(Parser, Debug)]
#[command(
    name = "timelock",
    about = "Submit operations to and read from a time-locked vault",
    version,
    propagate_version = true
)]
pub struct TimelockCli {
    /// API root of the node to talk to.
    #[arg(long, global = true, env = "TIMELOCK_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Caller address: `0x`-prefixed hex, or a label hashed into an address.
    #[arg(long, global = true, env = "TIMELOCK_FROM", default_value = "owner")]
    pub from: String,

    /// Seconds to wait for a submission to settle.
    #[arg(
        long,
        global = true,
        env = "TIMELOCK_CONFIRM_TIMEOUT_SECS",
        default_value_t = DEFAULT_CONFIRMATION_TIMEOUT.as_secs()
    )]
    pub confirm_timeout_secs: u64,

    /// Log output format.
    #[arg(long, global = true, env = "TIMELOCK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Use a private in-process ledger instead of a node.
    #[arg(long, global = true)]
    pub local: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Become the owner and set the reward parameters.
    Initialize {
        base_reward_rate: u128,
        time_bonus_multiplier: u128,
    },
    /// Lock funds. AMOUNT is in ETH, e.g. `1.5`.
    Deposit {
        amount: String,
        /// Lock period in seconds.
        #[arg(long, default_value_t = 86_400)]
        lock_period: u64,
    },
    /// Withdraw an unlocked deposit with its rewards.
    Withdraw,
    /// Leave early, paying the applicable penalty.
    EmergencyWithdraw,
    /// Collect pending rewards.
    ClaimRewards,
    /// (owner) Change the base reward rate.
    UpdateRewardRate { new_rate: u128 },
    /// (owner) Activate emergency mode. Irreversible.
    ActivateEmergencyMode,
    /// Add reward funds to the vault. AMOUNT is in ETH.
    FundVault { amount: String },
    /// (owner) Withdraw all discretionary owner funds.
    WithdrawVault,

    /// Pending rewards of ADDRESS (defaults to --from).
    PendingRewards { address: Option<String> },
    /// Deposit record of ADDRESS (defaults to --from).
    DepositInfo { address: Option<String> },
    /// Lock status and unlock time of ADDRESS (defaults to --from).
    DepositStatus { address: Option<String> },
    /// Sum of all locked principal.
    TotalLocked,
    /// Whether emergency mode is active.
    EmergencyMode,
    /// Current owner, if initialized.
    Owner,
    /// Everything the vault holds.
    VaultBalance,
    /// Base reward rate and time-bonus multiplier.
    RewardParameters,
    /// Full ledger snapshot as JSON.
    Snapshot,
    /// Receipt of a submission.
    Receipt { id: uuid::Uuid },
    /// Current ledger time.
    Now,
    /// Advance a dev clock by SECONDS.
    AdvanceTime { seconds: u64 },

    /// Run a scripted demo.
    Demo {
        #[arg(value_enum, default_value_t = Scenario::All)]
        scenario: Scenario,
    },
}

/// `0x…` parses as hex; anything else is hashed as a label.
pub fn parse_address(input: &str) -> Result<Address, timelock_protocol::types::AddressError> {
    if input.starts_with("0x") || input.starts_with("0X") {
        input.parse()
    } else {
        Ok(Address::from_label(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        TimelockCli::command().debug_assert();
    }

    #[test]
    fn global_flags_apply_to_subcommands() {
        let cli = TimelockCli::parse_from([
            "timelock",
            "deposit",
            "1.5",
            "--lock-period",
            "172800",
            "--from",
            "alice",
            "--local",
        ]);
        assert!(cli.local);
        assert_eq!(cli.from, "alice");
        match cli.command {
            Command::Deposit {
                amount,
                lock_period,
            } => {
                assert_eq!(amount, "1.5");
                assert_eq!(lock_period, 172_800);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn demo_defaults_to_all() {
        let cli = TimelockCli::parse_from(["timelock", "demo"]);
        assert!(matches!(cli.command, Command::Demo { scenario: Scenario::All }));
    }

    #[test]
    fn addresses_parse_as_hex_or_label() {
        let alice = Address::from_label("alice");
        assert_eq!(parse_address("alice").unwrap(), alice);
        assert_eq!(parse_address(&alice.to_hex()).unwrap(), alice);
        assert!(parse_address("0x1234").is_err());
    }
}
