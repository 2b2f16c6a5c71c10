//! # `timelock` Command-Line Client
//!
//! Thin wrapper over [`timelock_client`]: parses flags, picks a transport,
//! runs one command and prints the outcome.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use timelock_client::display::{self, format_duration, format_eth, format_wei, parse_eth};
use timelock_client::{
    scenarios, Deployment, HttpTransport, LocalTransport, PendingSubmission, VaultClient,
    VaultTransport,
};
use timelock_protocol::types::Address;
use timelock_protocol::LedgerParams;

use cli::{parse_address, Command, LogFormat, TimelockCli};

/// Per-request HTTP timeout; confirmation waits are bounded separately.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TimelockCli::parse();
    init_logging(cli.log_format);

    let confirm_timeout = Duration::from_secs(cli.confirm_timeout_secs);
    let transport: Arc<dyn VaultTransport> = if cli.local {
        Arc::new(
            LocalTransport::starting_now(LedgerParams::default())
                .context("failed to start in-process ledger")?,
        )
    } else {
        Arc::new(
            HttpTransport::new(&cli.rpc_url, REQUEST_TIMEOUT)
                .context("failed to build HTTP client")?,
        )
    };

    let caller = parse_address(&cli.from)
        .with_context(|| format!("invalid --from address {:?}", cli.from))?;
    let client = VaultClient::new(Arc::clone(&transport), caller).with_confirm_timeout(confirm_timeout);
    tracing::debug!(endpoint = %transport.endpoint(), caller = %caller, "client ready");

    match cli.command {
        Command::Demo { scenario } => {
            let deployment = if cli.local {
                Deployment::Local(LedgerParams::default())
            } else {
                Deployment::Remote(transport)
            };
            let reports = scenarios::run(scenario, &deployment, confirm_timeout)
                .await
                .with_context(|| format!("demo {:?} failed", scenario.name()))?;
            println!();
            for report in reports {
                display::success(&format!(
                    "{} scenario: {} steps, {} of ledger time",
                    report.scenario.name(),
                    report.steps,
                    format_duration(report.ledger_elapsed)
                ));
            }
            Ok(())
        }
        command => run_command(&client, command).await,
    }
}

async fn run_command(client: &VaultClient, command: Command) -> Result<()> {
    let account = |address: Option<String>| -> Result<Address> {
        match address {
            Some(a) => parse_address(&a).with_context(|| format!("invalid address {:?}", a)),
            None => Ok(client.caller()),
        }
    };

    match command {
        Command::Initialize {
            base_reward_rate,
            time_bonus_multiplier,
        } => confirm(client.initialize(base_reward_rate, time_bonus_multiplier).await?).await,
        Command::Deposit {
            amount,
            lock_period,
        } => {
            let wei = parse_eth(&amount).context("invalid deposit amount")?;
            confirm(client.deposit(wei, lock_period).await?).await
        }
        Command::Withdraw => confirm(client.withdraw().await?).await,
        Command::EmergencyWithdraw => confirm(client.emergency_withdraw().await?).await,
        Command::ClaimRewards => confirm(client.claim_rewards().await?).await,
        Command::UpdateRewardRate { new_rate } => {
            confirm(client.update_reward_rate(new_rate).await?).await
        }
        Command::ActivateEmergencyMode => confirm(client.activate_emergency_mode().await?).await,
        Command::FundVault { amount } => {
            let wei = parse_eth(&amount).context("invalid funding amount")?;
            confirm(client.fund_vault(wei).await?).await
        }
        Command::WithdrawVault => confirm(client.withdraw_vault().await?).await,

        Command::PendingRewards { address } => {
            let wei = client.pending_rewards(&account(address)?).await?;
            println!("{} ({})", format_eth(wei), format_wei(wei));
            Ok(())
        }
        Command::DepositInfo { address } => {
            let info = client.deposit_info(&account(address)?).await?;
            display::info("amount", &format_eth(info.amount));
            display::info("deposit time", &info.deposit_time.to_string());
            display::info("lock period", &format_duration(info.lock_period));
            display::info("last claim", &info.last_claim_time.to_string());
            Ok(())
        }
        Command::DepositStatus { address } => {
            let status = client.deposit_status(&account(address)?).await?;
            display::info("status", &format!("{:?}", status.status));
            if let Some(unlock_time) = status.unlock_time {
                let now = client.now().await?;
                display::info("unlock time", &unlock_time.to_string());
                display::info("remaining", &format_duration(unlock_time.saturating_sub(now)));
            }
            Ok(())
        }
        Command::TotalLocked => {
            println!("{}", format_eth(client.total_locked().await?));
            Ok(())
        }
        Command::EmergencyMode => {
            println!("{}", client.emergency_mode().await?);
            Ok(())
        }
        Command::Owner => {
            match client.owner().await? {
                Some(owner) => println!("{}", owner),
                None => println!("not initialized"),
            }
            Ok(())
        }
        Command::VaultBalance => {
            println!("{}", format_eth(client.vault_balance().await?));
            Ok(())
        }
        Command::RewardParameters => {
            let params = client.reward_parameters().await?;
            display::info("base reward rate", &params.base_reward_rate.to_string());
            display::info("time bonus multiplier", &params.time_bonus_multiplier.to_string());
            Ok(())
        }
        Command::Snapshot => {
            let snapshot = client.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Command::Receipt { id } => {
            let receipt = client.receipt(id).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Command::Now => {
            println!("{}", client.now().await?);
            Ok(())
        }
        Command::AdvanceTime { seconds } => {
            println!("{}", client.advance_time(seconds).await?);
            Ok(())
        }
        Command::Demo { .. } => Ok(()),
    }
}

/// Waits for `pending` to settle and prints its receipt.
async fn confirm(pending: PendingSubmission) -> Result<()> {
    let id = pending.id();
    let op = pending.operation().name();
    display::subsection(&format!("submitted {} as {}", op, id));
    let receipt = pending
        .confirmed()
        .await
        .with_context(|| format!("{} was not confirmed", op))?;
    display::success(&format!(
        "{} confirmed{}",
        op,
        receipt.seq.map(|s| format!(" (seq {})", s)).unwrap_or_default()
    ));
    for event in &receipt.events {
        display::info(event.name(), &serde_json::to_string(event)?);
    }
    Ok(())
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("timelock_client=info,warn"));
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
