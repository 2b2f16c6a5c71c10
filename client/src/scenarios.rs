//! # Demo Scenarios
//!
//! Scripted walkthroughs of the vault lifecycle, printed step by step.
//! Each scenario checks what it observes and fails with
//! [`ClientError::Unexpected`] when the deployment misbehaves.
//!
//! Waiting for an unlock uses the deployment's dev clock when it has one and
//! real sleeps otherwise. Against a shared node the scenarios use their own
//! account labels, so `all` can run them back to back on one ledger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::{info, warn};

use timelock_protocol::types::WEI_PER_ETH;
use timelock_protocol::vault::DepositState;
use timelock_protocol::{Address, Amount, LedgerParams, Receipt, Timestamp, VaultError, VaultEvent};

use crate::client::VaultClient;
use crate::display::{self, format_duration, format_eth, format_wei};
use crate::error::ClientError;
use crate::transport::{LocalTransport, VaultTransport};

/// Reward rate the demos initialize with.
pub const DEMO_BASE_REWARD_RATE: Amount = 100;
/// Time-bonus multiplier the demos initialize with.
pub const DEMO_TIME_BONUS_MULTIPLIER: Amount = 150;
/// Lock period of every demo deposit. One day.
pub const DEMO_LOCK_PERIOD: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Fund the reward pool, deposit twice, watch rewards accrue, claim.
    Rewards,
    /// Early withdrawal is refused; the owner opens the emergency exit.
    Emergency,
    /// Wait out a lock, withdraw, and drain the owner's leftover funds.
    Withdrawal,
    /// Every scenario in sequence.
    All,
}

impl Scenario {
    /// Scenarios that `All` expands to. Emergency runs last because it
    /// freezes deposits for good on a shared ledger.
    pub const SEQUENCE: [Scenario; 3] = [Scenario::Rewards, Scenario::Withdrawal, Scenario::Emergency];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Rewards => "rewards",
            Scenario::Emergency => "emergency",
            Scenario::Withdrawal => "withdrawal",
            Scenario::All => "all",
        }
    }
}

/// Where scenarios get their deployment from.
#[derive(Clone)]
pub enum Deployment {
    /// A fresh in-process ledger per scenario.
    Local(LedgerParams),
    /// One shared remote deployment.
    Remote(Arc<dyn VaultTransport>),
}

impl Deployment {
    fn transport(&self) -> Result<Arc<dyn VaultTransport>, ClientError> {
        match self {
            Deployment::Local(params) => {
                let transport = LocalTransport::starting_now(*params)
                    .map_err(|e| ClientError::Unexpected(format!("ledger params: {}", e)))?;
                Ok(Arc::new(transport))
            }
            Deployment::Remote(transport) => Ok(Arc::clone(transport)),
        }
    }
}

/// Summary of one completed scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub steps: u32,
    /// Ledger seconds that passed while the scenario ran.
    pub ledger_elapsed: u64,
}

/// Runs `scenario` (or every scenario, for [`Scenario::All`]).
pub async fn run(
    scenario: Scenario,
    deployment: &Deployment,
    confirm_timeout: Duration,
) -> Result<Vec<ScenarioReport>, ClientError> {
    let selected: Vec<Scenario> = match scenario {
        Scenario::All => Scenario::SEQUENCE.to_vec(),
        one => vec![one],
    };

    let mut reports = Vec::with_capacity(selected.len());
    for scenario in selected {
        let transport = deployment.transport()?;
        let started = Instant::now();
        let mut demo = Demo::new(transport, scenario, confirm_timeout).await?;
        match scenario {
            Scenario::Rewards => demo.rewards().await?,
            Scenario::Emergency => demo.emergency().await?,
            Scenario::Withdrawal => demo.withdrawal().await?,
            // Expanded above.
            Scenario::All => {}
        }
        let report = demo.finish().await?;
        display::timing(scenario.name(), started.elapsed());
        info!(scenario = scenario.name(), steps = report.steps, "scenario finished");
        reports.push(report);
    }
    Ok(reports)
}

// ---------------------------------------------------------------------------
// Scenario driver
// ---------------------------------------------------------------------------

struct Demo {
    scenario: Scenario,
    owner: VaultClient,
    alice: VaultClient,
    bob: VaultClient,
    dev_clock: bool,
    started_at: Timestamp,
    step: u32,
}

impl Demo {
    async fn new(
        transport: Arc<dyn VaultTransport>,
        scenario: Scenario,
        confirm_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let label = |who: &str| Address::from_label(&format!("{}/{}", scenario.name(), who));
        let owner = VaultClient::new(Arc::clone(&transport), Address::from_label("demo/owner"))
            .with_confirm_timeout(confirm_timeout);
        let alice = owner.acting_as(label("alice"));
        let bob = owner.acting_as(label("bob"));
        let dev_clock = owner.has_dev_clock().await?;
        let started_at = owner.now().await?;

        display::banner(
            &format!("TIMELOCK VAULT  --  {} scenario", scenario.name()),
            &format!(
                "{}  |  {}",
                transport.endpoint(),
                if dev_clock { "dev clock" } else { "wall clock" }
            ),
        );
        display::account("owner", &owner.caller());
        display::account("alice", &alice.caller());
        display::account("bob", &bob.caller());

        Ok(Self {
            scenario,
            owner,
            alice,
            bob,
            dev_clock,
            started_at,
            step: 0,
        })
    }

    fn section(&mut self, title: &str) {
        self.step += 1;
        display::section(self.step, title);
    }

    async fn finish(self) -> Result<ScenarioReport, ClientError> {
        let now = self.owner.now().await?;
        Ok(ScenarioReport {
            scenario: self.scenario,
            steps: self.step,
            ledger_elapsed: now.saturating_sub(self.started_at),
        })
    }

    /// Initializes the vault as the demo owner unless that already happened.
    async fn ensure_initialized(&mut self) -> Result<(), ClientError> {
        self.section("Initialize the vault");
        match self.owner.owner().await? {
            None => {
                let receipt = self
                    .owner
                    .initialize(DEMO_BASE_REWARD_RATE, DEMO_TIME_BONUS_MULTIPLIER)
                    .await?
                    .confirmed()
                    .await?;
                confirmed(&receipt, "vault initialized");
            }
            Some(owner) if owner == self.owner.caller() => {
                display::subsection("vault already initialized by the demo owner");
            }
            Some(other) => {
                return Err(ClientError::Unexpected(format!(
                    "vault is owned by {}, not the demo owner",
                    other
                )));
            }
        }

        let params = self.owner.reward_parameters().await?;
        display::info("base reward rate", &params.base_reward_rate.to_string());
        display::info("time bonus multiplier", &params.time_bonus_multiplier.to_string());

        if self.owner.emergency_mode().await? {
            return Err(ClientError::Unexpected(
                "emergency mode is already active; deposits are closed".into(),
            ));
        }
        Ok(())
    }

    /// Moves ledger time to `target`, by dev clock or by sleeping.
    async fn wait_until(&self, target: Timestamp) -> Result<(), ClientError> {
        let now = self.owner.now().await?;
        if now >= target {
            return Ok(());
        }
        let wait = target - now;
        if self.dev_clock {
            display::subsection(&format!("advancing the dev clock by {}", format_duration(wait)));
            self.owner.advance_time(wait).await?;
        } else {
            warn!(seconds = wait, "no dev clock; sleeping in real time");
            display::subsection(&format!("sleeping {} of wall-clock time", format_duration(wait)));
            tokio::time::sleep(Duration::from_secs(wait)).await;
            // The node's clock ticks in whole seconds.
            while self.owner.now().await? < target {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
        Ok(())
    }

    /// Reads the unlock time and waits for it.
    async fn wait_for_unlock(&self, client: &VaultClient) -> Result<(), ClientError> {
        let status = client.deposit_status(&client.caller()).await?;
        let unlock_time = status.unlock_time.ok_or_else(|| {
            ClientError::Unexpected(format!("{} has no deposit to unlock", client.caller()))
        })?;
        display::info("unlock time", &unlock_time.to_string());
        self.wait_until(unlock_time).await?;

        let status = client.deposit_status(&client.caller()).await?;
        expect(
            status.status == DepositState::Unlockable,
            format!("deposit still {:?} after waiting for unlock", status.status),
        )
    }

    // -- rewards ------------------------------------------------------------

    async fn rewards(&mut self) -> Result<(), ClientError> {
        self.ensure_initialized().await?;

        self.section("Owner funds the reward pool");
        let receipt = self.owner.fund_vault(WEI_PER_ETH).await?.confirmed().await?;
        confirmed(&receipt, &format!("funded {}", format_eth(WEI_PER_ETH)));
        display::info("vault balance", &format_eth(self.owner.vault_balance().await?));

        self.section("Alice deposits twice, back to back");
        let first = WEI_PER_ETH;
        let second = WEI_PER_ETH / 2;
        let receipt = self.alice.deposit(first, DEMO_LOCK_PERIOD).await?.confirmed().await?;
        confirmed(&receipt, &format!("deposited {}", format_eth(first)));
        let receipt = self.alice.deposit(second, DEMO_LOCK_PERIOD).await?.confirmed().await?;
        confirmed(&receipt, &format!("deposited {} more", format_eth(second)));
        expect(
            receipt
                .events
                .iter()
                .any(|e| matches!(e, VaultEvent::Deposited { merged: true, .. })),
            "second deposit did not merge into the first",
        )?;

        let info = self.alice.deposit_info(&self.alice.caller()).await?;
        display::info("locked", &format_eth(info.amount));
        display::info("lock period", &format_duration(info.lock_period));
        expect(
            info.amount == first + second,
            format!("expected {} locked, found {}", first + second, info.amount),
        )?;

        self.section("Watch pending rewards accrue");
        let mut last = 0;
        for _ in 0..3 {
            let now = self.owner.now().await?;
            self.wait_until(now + 10).await?;
            let pending = self.alice.pending_rewards(&self.alice.caller()).await?;
            display::info("pending rewards", &format_wei(pending));
            expect(
                pending > last,
                format!("pending rewards did not grow ({} -> {})", last, pending),
            )?;
            last = pending;
        }

        self.section("Alice claims");
        let reserve_before = self.owner_balance().await?;
        let receipt = self.alice.claim_rewards().await?.confirmed().await?;
        let claimed = receipt
            .events
            .iter()
            .find_map(|e| match e {
                VaultEvent::RewardsClaimed { amount, .. } => Some(*amount),
                _ => None,
            })
            .ok_or_else(|| ClientError::Unexpected("claim emitted no RewardsClaimed".into()))?;
        confirmed(&receipt, &format!("claimed {}", format_wei(claimed)));
        expect(claimed >= last, "claimed less than the last pending reading")?;
        expect(
            self.alice.pending_rewards(&self.alice.caller()).await? == 0,
            "pending rewards not reset by the claim",
        )?;
        expect(
            reserve_before.checked_sub(claimed) == Some(self.owner_balance().await?),
            "claim was not paid from the owner's funds",
        )
    }

    // -- emergency ----------------------------------------------------------

    async fn emergency(&mut self) -> Result<(), ClientError> {
        self.ensure_initialized().await?;

        self.section("Bob deposits with a one-day lock");
        let amount = WEI_PER_ETH;
        let receipt = self.bob.deposit(amount, DEMO_LOCK_PERIOD).await?.confirmed().await?;
        confirmed(&receipt, &format!("deposited {}", format_eth(amount)));

        self.section("Early withdrawal is refused");
        match self.bob.withdraw().await?.confirmed().await {
            Err(ClientError::Rejected(VaultError::StillLocked { unlock_time, now })) => {
                display::rejected(&format!(
                    "still locked for another {}",
                    format_duration(unlock_time.saturating_sub(now))
                ));
            }
            Err(e) => return Err(e),
            Ok(_) => {
                return Err(ClientError::Unexpected(
                    "withdrawal before unlock was accepted".into(),
                ))
            }
        }

        self.section("Owner activates emergency mode");
        let receipt = self
            .owner
            .activate_emergency_mode()
            .await?
            .confirmed()
            .await?;
        confirmed(&receipt, "emergency mode active");
        expect(self.owner.emergency_mode().await?, "emergency flag not set")?;

        self.section("Bob leaves through the emergency exit");
        let receipt = self.bob.emergency_withdraw().await?.confirmed().await?;
        let (returned, penalty, forfeited) = receipt
            .events
            .iter()
            .find_map(|e| match e {
                VaultEvent::EmergencyWithdrawn {
                    amount,
                    penalty,
                    forfeited_rewards,
                    ..
                } => Some((*amount, *penalty, *forfeited_rewards)),
                _ => None,
            })
            .ok_or_else(|| {
                ClientError::Unexpected("emergency withdrawal emitted no event".into())
            })?;
        confirmed(&receipt, &format!("returned {}", format_eth(returned)));
        display::info("penalty", &format_eth(penalty));
        display::info("forfeited rewards", &format_wei(forfeited));
        expect(
            returned + penalty == amount,
            "principal not fully accounted for",
        )?;

        self.section("Bob's deposit is gone");
        let info = self.bob.deposit_info(&self.bob.caller()).await?;
        let status = self.bob.deposit_status(&self.bob.caller()).await?;
        expect(
            info.amount == 0 && status.status == DepositState::NoDeposit,
            "deposit record survived the emergency withdrawal",
        )?;
        display::success("deposit record cleared");
        Ok(())
    }

    // -- withdrawal ---------------------------------------------------------

    async fn withdrawal(&mut self) -> Result<(), ClientError> {
        self.ensure_initialized().await?;

        self.section("Owner tops up the reward pool");
        let funding = WEI_PER_ETH / 10;
        let receipt = self.owner.fund_vault(funding).await?.confirmed().await?;
        confirmed(&receipt, &format!("funded {}", format_eth(funding)));

        self.section("Alice deposits with a one-day lock");
        let amount = WEI_PER_ETH;
        let receipt = self.alice.deposit(amount, DEMO_LOCK_PERIOD).await?.confirmed().await?;
        confirmed(&receipt, &format!("deposited {}", format_eth(amount)));

        self.section("Wait for the lock to expire");
        self.wait_for_unlock(&self.alice).await?;
        display::success("deposit unlocked");

        self.section("Alice withdraws principal and rewards");
        let receipt = self.alice.withdraw().await?.confirmed().await?;
        let (principal, rewards) = receipt
            .events
            .iter()
            .find_map(|e| match e {
                VaultEvent::Withdrawn {
                    amount, rewards, ..
                } => Some((*amount, *rewards)),
                _ => None,
            })
            .ok_or_else(|| ClientError::Unexpected("withdrawal emitted no event".into()))?;
        confirmed(&receipt, &format!("withdrew {}", format_eth(principal)));
        display::info("rewards", &format_wei(rewards));
        expect(principal == amount, "principal not returned in full")?;

        self.section("Owner withdraws the remaining discretionary funds");
        let receipt = self.owner.withdraw_vault().await?.confirmed().await?;
        let drained = receipt
            .events
            .iter()
            .find_map(|e| match e {
                VaultEvent::VaultWithdrawn { amount, .. } => Some(*amount),
                _ => None,
            })
            .ok_or_else(|| ClientError::Unexpected("vault withdrawal emitted no event".into()))?;
        confirmed(&receipt, &format!("owner withdrew {}", format_eth(drained)));
        expect(
            self.owner_balance().await? == 0,
            "owner funds left after withdrawVault",
        )
    }

    /// Owner funds: everything in the vault that is not locked principal.
    async fn owner_balance(&self) -> Result<Amount, ClientError> {
        Ok(self.owner.snapshot().await?.owner_balance)
    }
}

fn confirmed(receipt: &Receipt, what: &str) {
    match receipt.seq {
        Some(seq) => display::success(&format!("{} (seq {})", what, seq)),
        None => display::success(what),
    }
}

fn expect(condition: bool, failure: impl Into<String>) -> Result<(), ClientError> {
    if condition {
        Ok(())
    } else {
        Err(ClientError::Unexpected(failure.into()))
    }
}
