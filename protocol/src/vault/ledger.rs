//! # Vault Ledger
//!
//! The state machine behind every vault operation.
//!
//! ## State
//!
//! A small set of ledger-wide fields ([`Globals`]) plus one [`Deposit`] per
//! account with principal. Both live behind a single `parking_lot::RwLock`,
//! so a reader either sees an operation's full effect (account record and
//! aggregates together) or none of it.
//!
//! ## Locking
//!
//! Mutations on different accounts serialize on that one lock: every
//! deposit and withdrawal also moves `total_locked` and `owner_balance`, and
//! those must change in the same step as the account record. Critical
//! sections hold no I/O except the journal append (a buffered sled write, no
//! fsync), so the wait is bounded by in-memory work. Flushing happens in
//! [`VaultService`](crate::service::VaultService), outside the lock, and
//! per-caller ordering is the service's job, not the lock's.
//!
//! ## Applying an operation
//!
//! ```text
//! write lock ─► validate + compute Transition (pure, no mutation)
//!            ─► journal.append(entry)            (refusal = no change)
//!            ─► commit Transition to memory
//! ```
//!
//! Validation never touches state, so every rejection is side-effect free.
//! Operations that succeed without changing anything (a zero-reward claim, a
//! repeated emergency activation) are neither journaled nor numbered.
//!
//! ## Time
//!
//! `now` comes from the injected [`Clock`](crate::clock::Clock), but never
//! goes backwards from the ledger's point of view: it is floored at the
//! timestamp of the last applied operation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::deposit::{Deposit, DepositInfo, DepositStatus};
use super::error::VaultError;
use super::operation::{Applied, Operation, VaultEvent};
use super::rewards::{mul_div, RewardSchedule};
use crate::clock::SharedClock;
use crate::config::{LedgerParams, ParamsError, BPS_DENOMINATOR};
use crate::storage::{Journal, JournalEntry};
use crate::types::{amount, Address, Amount, Timestamp};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Globals {
    owner: Option<Address>,
    schedule: Option<RewardSchedule>,
    total_locked: Amount,
    owner_balance: Amount,
    emergency_mode: bool,
    /// Timestamp of the last applied operation.
    last_applied_at: Timestamp,
}

#[derive(Debug, Default)]
struct LedgerState {
    globals: Globals,
    deposits: HashMap<Address, Deposit>,
    seq: u64,
}

/// The computed effect of one operation, not yet committed.
struct Transition {
    globals: Globals,
    /// `Some((account, None))` removes the account's record.
    account: Option<(Address, Option<Deposit>)>,
    events: Vec<VaultEvent>,
}

impl LedgerState {
    fn initialized(&self) -> Result<(Address, RewardSchedule), VaultError> {
        match (self.globals.owner, self.globals.schedule) {
            (Some(owner), Some(schedule)) => Ok((owner, schedule)),
            _ => Err(VaultError::NotInitialized),
        }
    }

    fn active_deposit(&self, account: &Address) -> Result<Deposit, VaultError> {
        self.deposits
            .get(account)
            .copied()
            .filter(|d| d.amount > 0)
            .ok_or(VaultError::NoDeposit { account: *account })
    }

    fn effective_now(&self, now: Timestamp) -> Timestamp {
        now.max(self.globals.last_applied_at)
    }

    fn commit(&mut self, transition: Transition, seq: u64, now: Timestamp) {
        self.globals = transition.globals;
        self.globals.last_applied_at = now;
        match transition.account {
            Some((account, Some(deposit))) => {
                self.deposits.insert(account, deposit);
            }
            Some((account, None)) => {
                self.deposits.remove(&account);
            }
            None => {}
        }
        self.seq = seq;
    }
}

// ---------------------------------------------------------------------------
// Read views
// ---------------------------------------------------------------------------

/// `rewardParameters()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardParameters {
    #[serde(with = "amount")]
    pub base_reward_rate: Amount,
    #[serde(with = "amount")]
    pub time_bonus_multiplier: Amount,
}

/// One account inside a [`LedgerSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeposit {
    pub account: Address,
    pub deposit: DepositInfo,
    #[serde(with = "amount")]
    pub pending_rewards: Amount,
}

/// Every global field and every active deposit, read under one lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub owner: Option<Address>,
    pub reward_parameters: Option<RewardParameters>,
    #[serde(with = "amount")]
    pub total_locked: Amount,
    #[serde(with = "amount")]
    pub owner_balance: Amount,
    #[serde(with = "amount")]
    pub vault_balance: Amount,
    pub emergency_mode: bool,
    /// Sorted by account.
    pub deposits: Vec<AccountDeposit>,
}

/// A broken bookkeeping invariant, reported by [`VaultLedger::audit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("total_locked is {recorded} but deposits sum to {actual}")]
    TotalLockedMismatch { recorded: Amount, actual: Amount },

    #[error("account {account} claimed at {last_claim_time}, before its deposit at {deposit_time}")]
    ClaimBeforeDeposit {
        account: Address,
        deposit_time: Timestamp,
        last_claim_time: Timestamp,
    },

    #[error("account {account} has a zero-amount record")]
    EmptyRecord { account: Address },
}

// ---------------------------------------------------------------------------
// VaultLedger
// ---------------------------------------------------------------------------

/// The time-locked, reward-accruing deposit ledger.
///
/// Share it as `Arc<VaultLedger>`; every method takes `&self`.
#[derive(Debug)]
pub struct VaultLedger {
    params: LedgerParams,
    clock: SharedClock,
    journal: Option<Arc<dyn Journal>>,
    state: RwLock<LedgerState>,
}

impl VaultLedger {
    /// Creates an empty, uninitialized ledger without a journal.
    pub fn new(params: LedgerParams, clock: SharedClock) -> Result<Self, ParamsError> {
        params.validate()?;
        Ok(Self {
            params,
            clock,
            journal: None,
            state: RwLock::new(LedgerState::default()),
        })
    }

    /// Records every applied operation in `journal` from now on.
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn journal(&self) -> Option<&Arc<dyn Journal>> {
        self.journal.as_ref()
    }

    /// The ledger's notion of "now": the clock, floored at the last applied
    /// operation's timestamp.
    pub fn now(&self) -> Timestamp {
        self.state.read().effective_now(self.clock.now())
    }

    // -- State-changing operations ------------------------------------------

    /// Applies `operation` on behalf of `caller` at the current clock time.
    pub fn execute(&self, caller: Address, operation: Operation) -> Result<Applied, VaultError> {
        self.apply(caller, operation, self.clock.now(), true)
    }

    pub fn initialize(
        &self,
        caller: Address,
        base_reward_rate: Amount,
        time_bonus_multiplier: Amount,
    ) -> Result<Applied, VaultError> {
        self.execute(
            caller,
            Operation::Initialize {
                base_reward_rate,
                time_bonus_multiplier,
            },
        )
    }

    pub fn deposit(
        &self,
        caller: Address,
        amount: Amount,
        lock_period: u64,
    ) -> Result<Applied, VaultError> {
        self.execute(
            caller,
            Operation::Deposit {
                amount,
                lock_period,
            },
        )
    }

    pub fn withdraw(&self, caller: Address) -> Result<Applied, VaultError> {
        self.execute(caller, Operation::Withdraw)
    }

    pub fn emergency_withdraw(&self, caller: Address) -> Result<Applied, VaultError> {
        self.execute(caller, Operation::EmergencyWithdraw)
    }

    pub fn claim_rewards(&self, caller: Address) -> Result<Applied, VaultError> {
        self.execute(caller, Operation::ClaimRewards)
    }

    pub fn update_reward_rate(
        &self,
        caller: Address,
        new_rate: Amount,
    ) -> Result<Applied, VaultError> {
        self.execute(caller, Operation::UpdateRewardRate { new_rate })
    }

    pub fn activate_emergency_mode(&self, caller: Address) -> Result<Applied, VaultError> {
        self.execute(caller, Operation::ActivateEmergencyMode)
    }

    pub fn fund_vault(&self, caller: Address, amount: Amount) -> Result<Applied, VaultError> {
        self.execute(caller, Operation::FundVault { amount })
    }

    pub fn withdraw_vault(&self, caller: Address) -> Result<Applied, VaultError> {
        self.execute(caller, Operation::WithdrawVault)
    }

    /// Re-applies journaled operations to a fresh ledger.
    ///
    /// Each entry is evaluated at its recorded timestamp and is not written
    /// back to the journal. Replay stops at the first gap or rejection.
    /// Returns the last applied sequence number.
    pub fn replay<I>(&self, entries: I) -> Result<u64, VaultError>
    where
        I: IntoIterator<Item = JournalEntry>,
    {
        for entry in entries {
            let expected = self.seq() + 1;
            if entry.seq != expected {
                return Err(VaultError::Journal(format!(
                    "replay gap: expected seq {}, found {}",
                    expected, entry.seq
                )));
            }
            let applied = self.apply(entry.caller, entry.operation, entry.timestamp, false)?;
            if applied.seq != Some(entry.seq) {
                return Err(VaultError::Journal(format!(
                    "replay diverged at seq {}: operation changed no state",
                    entry.seq
                )));
            }
        }
        let seq = self.seq();
        info!(seq, "journal replayed");
        Ok(seq)
    }

    fn apply(
        &self,
        caller: Address,
        operation: Operation,
        clock_now: Timestamp,
        record: bool,
    ) -> Result<Applied, VaultError> {
        if caller.is_zero() {
            return Err(VaultError::invalid("caller", "the zero address cannot act"));
        }

        let mut state = self.state.write();
        let now = state.effective_now(clock_now);

        let transition = match self.transition(&state, caller, &operation, now) {
            Ok(t) => t,
            Err(err) => {
                debug!(%caller, op = operation.name(), error = %err, "operation rejected");
                return Err(err);
            }
        };

        let Some(mut transition) = transition else {
            debug!(%caller, op = operation.name(), "operation succeeded without state change");
            return Ok(Applied {
                seq: None,
                timestamp: now,
                events: Vec::new(),
            });
        };

        let seq = state.seq + 1;
        if record {
            if let Some(journal) = &self.journal {
                let entry = JournalEntry {
                    seq,
                    timestamp: now,
                    caller,
                    operation: operation.clone(),
                };
                journal.append(&entry).map_err(|e| {
                    debug!(%caller, seq, error = %e, "journal refused entry");
                    VaultError::Journal(e.to_string())
                })?;
            }
        }

        let events = std::mem::take(&mut transition.events);
        state.commit(transition, seq, now);

        info!(
            %caller,
            seq,
            op = operation.name(),
            total_locked = %state.globals.total_locked,
            owner_balance = %state.globals.owner_balance,
            "operation applied"
        );

        Ok(Applied {
            seq: Some(seq),
            timestamp: now,
            events,
        })
    }

    fn transition(
        &self,
        state: &LedgerState,
        caller: Address,
        operation: &Operation,
        now: Timestamp,
    ) -> Result<Option<Transition>, VaultError> {
        match *operation {
            Operation::Initialize {
                base_reward_rate,
                time_bonus_multiplier,
            } => self.initialize_transition(state, caller, base_reward_rate, time_bonus_multiplier, now),
            Operation::Deposit {
                amount,
                lock_period,
            } => self.deposit_transition(state, caller, amount, lock_period, now),
            Operation::Withdraw => withdraw_transition(state, caller, now),
            Operation::EmergencyWithdraw => self.emergency_withdraw_transition(state, caller, now),
            Operation::ClaimRewards => claim_transition(state, caller, now),
            Operation::UpdateRewardRate { new_rate } => {
                update_rate_transition(state, caller, new_rate, now)
            }
            Operation::ActivateEmergencyMode => emergency_mode_transition(state, caller),
            Operation::FundVault { amount } => fund_transition(state, caller, amount),
            Operation::WithdrawVault => withdraw_vault_transition(state, caller),
        }
    }

    fn initialize_transition(
        &self,
        state: &LedgerState,
        caller: Address,
        base_reward_rate: Amount,
        time_bonus_multiplier: Amount,
        now: Timestamp,
    ) -> Result<Option<Transition>, VaultError> {
        if state.globals.owner.is_some() {
            return Err(VaultError::AlreadyInitialized);
        }
        // Reject multipliers that would overflow the bonus at the longest lock.
        super::rewards::bonus_factor_bps(time_bonus_multiplier, self.params.max_lock_period)
            .map_err(|_| VaultError::invalid("timeBonusMultiplier", "too large"))?;

        let mut globals = state.globals.clone();
        globals.owner = Some(caller);
        globals.schedule = Some(RewardSchedule::new(base_reward_rate, time_bonus_multiplier, now));

        Ok(Some(Transition {
            globals,
            account: None,
            events: vec![VaultEvent::Initialized {
                owner: caller,
                base_reward_rate,
                time_bonus_multiplier,
            }],
        }))
    }

    fn deposit_transition(
        &self,
        state: &LedgerState,
        caller: Address,
        amount: Amount,
        lock_period: u64,
        now: Timestamp,
    ) -> Result<Option<Transition>, VaultError> {
        let (_, schedule) = state.initialized()?;
        if state.globals.emergency_mode {
            return Err(VaultError::EmergencyModeActive);
        }
        if amount == 0 {
            return Err(VaultError::invalid("amount", "must be greater than zero"));
        }
        if !self.params.accepts_lock_period(lock_period) {
            return Err(VaultError::invalid(
                "lockPeriod",
                format!(
                    "must be between {} and {} seconds, got {}",
                    self.params.min_lock_period, self.params.max_lock_period, lock_period
                ),
            ));
        }

        let index = schedule.index_at(now)?;
        let requested_unlock = now
            .checked_add(lock_period)
            .ok_or_else(|| VaultError::overflow("unlock time"))?;

        let (deposit, merged) = match state.active_deposit(&caller) {
            Ok(existing) => {
                let settled = existing.pending_rewards(&schedule, now)?;
                let unlock = existing.unlock_time().max(requested_unlock);
                let merged = Deposit {
                    amount: existing
                        .amount
                        .checked_add(amount)
                        .ok_or_else(|| VaultError::overflow("deposit amount"))?,
                    deposit_time: existing.deposit_time,
                    lock_period: unlock - existing.deposit_time,
                    last_claim_time: now,
                    accrued_rewards: settled,
                    reward_index: index,
                };
                (merged, true)
            }
            Err(_) => (
                Deposit {
                    amount,
                    deposit_time: now,
                    lock_period,
                    last_claim_time: now,
                    accrued_rewards: 0,
                    reward_index: index,
                },
                false,
            ),
        };

        let mut globals = state.globals.clone();
        globals.total_locked = globals
            .total_locked
            .checked_add(amount)
            .ok_or_else(|| VaultError::overflow("total locked"))?;
        // Keeps vaultBalance = totalLocked + ownerBalance representable.
        globals
            .total_locked
            .checked_add(globals.owner_balance)
            .ok_or_else(|| VaultError::overflow("vault balance"))?;

        Ok(Some(Transition {
            globals,
            account: Some((caller, Some(deposit))),
            events: vec![VaultEvent::Deposited {
                user: caller,
                amount,
                unlock_time: deposit.unlock_time(),
                merged,
            }],
        }))
    }

    fn emergency_withdraw_transition(
        &self,
        state: &LedgerState,
        caller: Address,
        now: Timestamp,
    ) -> Result<Option<Transition>, VaultError> {
        let (_, schedule) = state.initialized()?;
        let deposit = state.active_deposit(&caller)?;

        let penalty_bps = if state.globals.emergency_mode {
            self.params.emergency_penalty_bps
        } else if deposit.is_unlocked(now) {
            0
        } else {
            self.params.early_exit_penalty_bps
        };
        let penalty = mul_div(deposit.amount, penalty_bps as u128, BPS_DENOMINATOR)
            .ok_or_else(|| VaultError::overflow("penalty"))?;
        let payout = deposit.amount - penalty;
        // An accrual overflow must not block the exit; report what was settled.
        let forfeited = deposit
            .pending_rewards(&schedule, now)
            .unwrap_or(deposit.accrued_rewards);

        let mut globals = state.globals.clone();
        globals.total_locked -= deposit.amount;
        globals.owner_balance += penalty;

        Ok(Some(Transition {
            globals,
            account: Some((caller, None)),
            events: vec![VaultEvent::EmergencyWithdrawn {
                user: caller,
                amount: payout,
                penalty,
                forfeited_rewards: forfeited,
            }],
        }))
    }
}

fn require_owner(owner: Address, caller: Address) -> Result<(), VaultError> {
    if owner != caller {
        return Err(VaultError::Unauthorized { caller });
    }
    Ok(())
}

fn withdraw_transition(
    state: &LedgerState,
    caller: Address,
    now: Timestamp,
) -> Result<Option<Transition>, VaultError> {
    let (_, schedule) = state.initialized()?;
    let deposit = state.active_deposit(&caller)?;
    if state.globals.emergency_mode {
        return Err(VaultError::EmergencyModeActive);
    }
    if !deposit.is_unlocked(now) {
        return Err(VaultError::StillLocked {
            unlock_time: deposit.unlock_time(),
            now,
        });
    }

    // Principal always goes back; rewards that cannot be computed are forfeited.
    let owed = match deposit.pending_rewards(&schedule, now) {
        Ok(owed) => owed,
        Err(err) => {
            debug!(%caller, error = %err, "rewards not computable on withdraw");
            deposit.accrued_rewards
        }
    };
    let paid = owed.min(state.globals.owner_balance);

    let mut globals = state.globals.clone();
    globals.total_locked -= deposit.amount;
    globals.owner_balance -= paid;

    Ok(Some(Transition {
        globals,
        account: Some((caller, None)),
        events: vec![VaultEvent::Withdrawn {
            user: caller,
            amount: deposit.amount,
            rewards: paid,
            forfeited_rewards: owed - paid,
        }],
    }))
}

fn claim_transition(
    state: &LedgerState,
    caller: Address,
    now: Timestamp,
) -> Result<Option<Transition>, VaultError> {
    let (_, schedule) = state.initialized()?;
    let deposit = state.active_deposit(&caller)?;
    if state.globals.emergency_mode {
        return Err(VaultError::EmergencyModeActive);
    }

    let pending = deposit.pending_rewards(&schedule, now)?;
    if pending == 0 {
        return Ok(None);
    }
    if pending > state.globals.owner_balance {
        return Err(VaultError::InsufficientUnlockedFunds {
            requested: pending,
            available: state.globals.owner_balance,
        });
    }

    let settled = Deposit {
        last_claim_time: now,
        accrued_rewards: 0,
        reward_index: schedule.index_at(now)?,
        ..deposit
    };
    let mut globals = state.globals.clone();
    globals.owner_balance -= pending;

    Ok(Some(Transition {
        globals,
        account: Some((caller, Some(settled))),
        events: vec![VaultEvent::RewardsClaimed {
            user: caller,
            amount: pending,
        }],
    }))
}

fn update_rate_transition(
    state: &LedgerState,
    caller: Address,
    new_rate: Amount,
    now: Timestamp,
) -> Result<Option<Transition>, VaultError> {
    let (owner, mut schedule) = state.initialized()?;
    require_owner(owner, caller)?;

    let old_rate = schedule.set_rate(new_rate, now)?;
    let mut globals = state.globals.clone();
    globals.schedule = Some(schedule);

    Ok(Some(Transition {
        globals,
        account: None,
        events: vec![VaultEvent::RewardRateUpdated { old_rate, new_rate }],
    }))
}

fn emergency_mode_transition(
    state: &LedgerState,
    caller: Address,
) -> Result<Option<Transition>, VaultError> {
    let (owner, _) = state.initialized()?;
    require_owner(owner, caller)?;
    if state.globals.emergency_mode {
        return Ok(None);
    }

    let mut globals = state.globals.clone();
    globals.emergency_mode = true;

    Ok(Some(Transition {
        globals,
        account: None,
        events: vec![VaultEvent::EmergencyModeActivated { by: caller }],
    }))
}

fn fund_transition(
    state: &LedgerState,
    caller: Address,
    amount: Amount,
) -> Result<Option<Transition>, VaultError> {
    state.initialized()?;
    if amount == 0 {
        return Err(VaultError::invalid("amount", "must be greater than zero"));
    }

    let mut globals = state.globals.clone();
    globals.owner_balance = globals
        .owner_balance
        .checked_add(amount)
        .and_then(|balance| balance.checked_add(globals.total_locked).map(|_| balance))
        .ok_or_else(|| VaultError::overflow("owner balance"))?;

    Ok(Some(Transition {
        globals,
        account: None,
        events: vec![VaultEvent::VaultFunded {
            from: caller,
            amount,
        }],
    }))
}

fn withdraw_vault_transition(
    state: &LedgerState,
    caller: Address,
) -> Result<Option<Transition>, VaultError> {
    let (owner, _) = state.initialized()?;
    require_owner(owner, caller)?;

    // Only the discretionary pool leaves; locked principal is never touched.
    let available = state.globals.owner_balance;
    if available == 0 {
        return Err(VaultError::InsufficientUnlockedFunds {
            requested: 0,
            available,
        });
    }

    let mut globals = state.globals.clone();
    globals.owner_balance = 0;

    Ok(Some(Transition {
        globals,
        account: None,
        events: vec![VaultEvent::VaultWithdrawn {
            owner: caller,
            amount: available,
        }],
    }))
}

// -- Reads -------------------------------------------------------------------

impl VaultLedger {
    /// Rewards `account` could claim right now. Zero without a deposit.
    pub fn calculate_pending_rewards(&self, account: &Address) -> Result<Amount, VaultError> {
        let state = self.state.read();
        let now = state.effective_now(self.clock.now());
        match (state.globals.schedule, state.deposits.get(account)) {
            (Some(schedule), Some(deposit)) => deposit.pending_rewards(&schedule, now),
            _ => Ok(0),
        }
    }

    /// `(amount, depositTime, lockPeriod, lastClaimTime)`, zeros if unknown.
    pub fn get_deposit_info(&self, account: &Address) -> DepositInfo {
        self.state
            .read()
            .deposits
            .get(account)
            .map(Deposit::info)
            .unwrap_or_default()
    }

    pub fn deposit_status(&self, account: &Address) -> DepositStatus {
        let state = self.state.read();
        let now = state.effective_now(self.clock.now());
        DepositStatus::of(state.deposits.get(account), now)
    }

    pub fn get_total_locked(&self) -> Amount {
        self.state.read().globals.total_locked
    }

    pub fn get_emergency_mode(&self) -> bool {
        self.state.read().globals.emergency_mode
    }

    pub fn owner(&self) -> Option<Address> {
        self.state.read().globals.owner
    }

    pub fn owner_balance(&self) -> Amount {
        self.state.read().globals.owner_balance
    }

    /// All funds held: locked principal plus the discretionary pool.
    pub fn vault_balance(&self) -> Amount {
        let state = self.state.read();
        state.globals.total_locked + state.globals.owner_balance
    }

    pub fn reward_parameters(&self) -> Option<RewardParameters> {
        self.state
            .read()
            .globals
            .schedule
            .map(|s| RewardParameters {
                base_reward_rate: s.base_reward_rate,
                time_bonus_multiplier: s.time_bonus_multiplier,
            })
    }

    /// Sequence number of the last applied operation.
    pub fn seq(&self) -> u64 {
        self.state.read().seq
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().globals.owner.is_some()
    }

    /// Number of accounts with principal.
    pub fn depositor_count(&self) -> usize {
        self.state.read().deposits.len()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read();
        let now = state.effective_now(self.clock.now());
        let schedule = state.globals.schedule;

        let mut deposits: Vec<AccountDeposit> = state
            .deposits
            .iter()
            .map(|(account, deposit)| AccountDeposit {
                account: *account,
                deposit: deposit.info(),
                pending_rewards: schedule
                    .and_then(|s| deposit.pending_rewards(&s, now).ok())
                    .unwrap_or(0),
            })
            .collect();
        deposits.sort_by_key(|d| d.account);

        LedgerSnapshot {
            seq: state.seq,
            timestamp: now,
            owner: state.globals.owner,
            reward_parameters: schedule.map(|s| RewardParameters {
                base_reward_rate: s.base_reward_rate,
                time_bonus_multiplier: s.time_bonus_multiplier,
            }),
            total_locked: state.globals.total_locked,
            owner_balance: state.globals.owner_balance,
            vault_balance: state.globals.total_locked + state.globals.owner_balance,
            emergency_mode: state.globals.emergency_mode,
            deposits,
        }
    }

    /// Checks the bookkeeping invariants against the current state.
    pub fn audit(&self) -> Result<(), AuditError> {
        let state = self.state.read();
        let mut actual: Amount = 0;
        for (account, deposit) in &state.deposits {
            if deposit.amount == 0 {
                return Err(AuditError::EmptyRecord { account: *account });
            }
            if deposit.last_claim_time < deposit.deposit_time {
                return Err(AuditError::ClaimBeforeDeposit {
                    account: *account,
                    deposit_time: deposit.deposit_time,
                    last_claim_time: deposit.last_claim_time,
                });
            }
            actual = actual.saturating_add(deposit.amount);
        }
        if actual != state.globals.total_locked {
            return Err(AuditError::TotalLockedMismatch {
                recorded: state.globals.total_locked,
                actual,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{JournalError, MemoryJournal};
    use crate::types::WEI_PER_ETH;

    const DAY: u64 = 86_400;
    const START: Timestamp = 1_700_000_000;

    struct Fixture {
        ledger: VaultLedger,
        clock: Arc<ManualClock>,
        owner: Address,
        alice: Address,
        bob: Address,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(START));
        let ledger = VaultLedger::new(LedgerParams::default(), clock.clone()).unwrap();
        let owner = Address::from_label("owner");
        ledger.initialize(owner, 100, 150).unwrap();
        Fixture {
            ledger,
            clock,
            owner,
            alice: Address::from_label("alice"),
            bob: Address::from_label("bob"),
        }
    }

    fn funded() -> Fixture {
        let f = fixture();
        f.ledger.fund_vault(f.owner, WEI_PER_ETH).unwrap();
        f
    }

    #[test]
    fn operations_before_initialize_fail() {
        let clock = Arc::new(ManualClock::new(START));
        let ledger = VaultLedger::new(LedgerParams::default(), clock).unwrap();
        let alice = Address::from_label("alice");
        assert_eq!(
            ledger.deposit(alice, 1, DAY),
            Err(VaultError::NotInitialized)
        );
        assert_eq!(ledger.fund_vault(alice, 1), Err(VaultError::NotInitialized));
        assert_eq!(ledger.owner(), None);
        assert_eq!(ledger.calculate_pending_rewards(&alice), Ok(0));
    }

    #[test]
    fn initialize_is_one_time_and_sets_owner() {
        let f = fixture();
        assert_eq!(f.ledger.owner(), Some(f.owner));
        assert_eq!(
            f.ledger.initialize(f.alice, 1, 1),
            Err(VaultError::AlreadyInitialized)
        );
        assert_eq!(
            f.ledger.reward_parameters(),
            Some(RewardParameters {
                base_reward_rate: 100,
                time_bonus_multiplier: 150
            })
        );
    }

    #[test]
    fn zero_address_cannot_act() {
        let f = fixture();
        assert!(matches!(
            f.ledger.deposit(Address::ZERO, 1, DAY),
            Err(VaultError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn deposit_validates_inputs() {
        let f = fixture();
        assert!(matches!(
            f.ledger.deposit(f.alice, 0, DAY),
            Err(VaultError::InvalidParameter { ref name, .. }) if name == "amount"
        ));
        assert!(matches!(
            f.ledger.deposit(f.alice, 1, DAY - 1),
            Err(VaultError::InvalidParameter { ref name, .. }) if name == "lockPeriod"
        ));
        assert!(matches!(
            f.ledger.deposit(f.alice, 1, 366 * DAY),
            Err(VaultError::InvalidParameter { .. })
        ));
        assert_eq!(f.ledger.get_total_locked(), 0);
    }

    #[test]
    fn deposit_records_position_and_total() {
        let f = fixture();
        let applied = f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        assert_eq!(applied.seq, Some(2));
        assert_eq!(
            applied.events,
            vec![VaultEvent::Deposited {
                user: f.alice,
                amount: WEI_PER_ETH,
                unlock_time: START + DAY,
                merged: false,
            }]
        );
        assert_eq!(
            f.ledger.get_deposit_info(&f.alice).as_tuple(),
            (WEI_PER_ETH, START, DAY, START)
        );
        assert_eq!(f.ledger.get_total_locked(), WEI_PER_ETH);
        assert_eq!(f.ledger.vault_balance(), WEI_PER_ETH);
    }

    #[test]
    fn redeposit_merges_and_settles() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.clock.advance(10);
        let before = f.ledger.calculate_pending_rewards(&f.alice).unwrap();
        assert_eq!(before, 1_015);

        let applied = f.ledger.deposit(f.alice, WEI_PER_ETH, 2 * DAY).unwrap();
        assert!(matches!(
            applied.events[0],
            VaultEvent::Deposited { merged: true, .. }
        ));

        let info = f.ledger.get_deposit_info(&f.alice);
        assert_eq!(info.amount, 2 * WEI_PER_ETH);
        assert_eq!(info.deposit_time, START);
        assert_eq!(info.unlock_time(), START + 10 + 2 * DAY);
        assert_eq!(info.last_claim_time, START + 10);
        // Settled rewards survive the merge.
        assert_eq!(f.ledger.calculate_pending_rewards(&f.alice).unwrap(), before);
        assert_eq!(f.ledger.get_total_locked(), 2 * WEI_PER_ETH);
    }

    #[test]
    fn merge_never_shortens_the_lock() {
        let f = fixture();
        f.ledger.deposit(f.alice, 10, 30 * DAY).unwrap();
        f.ledger.deposit(f.alice, 10, DAY).unwrap();
        assert_eq!(
            f.ledger.get_deposit_info(&f.alice).unlock_time(),
            START + 30 * DAY
        );
    }

    #[test]
    fn withdraw_is_time_gated() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.clock.advance(DAY - 1);
        assert_eq!(
            f.ledger.withdraw(f.alice),
            Err(VaultError::StillLocked {
                unlock_time: START + DAY,
                now: START + DAY - 1
            })
        );

        f.clock.advance(1);
        let applied = f.ledger.withdraw(f.alice).unwrap();
        let VaultEvent::Withdrawn {
            amount,
            rewards,
            forfeited_rewards,
            ..
        } = applied.events[0]
        else {
            panic!("unexpected event {:?}", applied.events);
        };
        assert_eq!(amount, WEI_PER_ETH);
        assert!(rewards > 0);
        assert_eq!(forfeited_rewards, 0);
        assert_eq!(f.ledger.get_deposit_info(&f.alice), DepositInfo::default());
        assert_eq!(f.ledger.get_total_locked(), 0);
        assert_eq!(f.ledger.owner_balance(), WEI_PER_ETH - rewards);
    }

    #[test]
    fn withdraw_without_deposit_fails() {
        let f = fixture();
        assert_eq!(
            f.ledger.withdraw(f.alice),
            Err(VaultError::NoDeposit { account: f.alice })
        );
    }

    #[test]
    fn withdraw_forfeits_what_the_reserve_cannot_cover() {
        let f = fixture();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.clock.advance(DAY);
        let owed = f.ledger.calculate_pending_rewards(&f.alice).unwrap();
        f.ledger.fund_vault(f.bob, 100).unwrap();

        let applied = f.ledger.withdraw(f.alice).unwrap();
        assert_eq!(
            applied.events[0],
            VaultEvent::Withdrawn {
                user: f.alice,
                amount: WEI_PER_ETH,
                rewards: 100,
                forfeited_rewards: owed - 100,
            }
        );
        assert_eq!(f.ledger.owner_balance(), 0);
    }

    #[test]
    fn withdraw_returns_principal_when_rewards_overflow() {
        let clock = Arc::new(ManualClock::new(START));
        let ledger = VaultLedger::new(LedgerParams::default(), clock.clone()).unwrap();
        let owner = Address::from_label("owner");
        let alice = Address::from_label("alice");
        ledger.initialize(owner, u128::MAX / 4, 0).unwrap();
        ledger.fund_vault(owner, 500).unwrap();
        ledger.deposit(alice, WEI_PER_ETH, DAY).unwrap();
        clock.advance(DAY);

        // The index itself no longer fits, so nothing is claimable...
        assert!(matches!(
            ledger.claim_rewards(alice),
            Err(VaultError::Overflow { .. })
        ));
        // ...but the principal still comes back.
        let applied = ledger.withdraw(alice).unwrap();
        assert_eq!(
            applied.events,
            vec![VaultEvent::Withdrawn {
                user: alice,
                amount: WEI_PER_ETH,
                rewards: 0,
                forfeited_rewards: 0,
            }]
        );
        assert_eq!(ledger.get_total_locked(), 0);
        assert_eq!(ledger.owner_balance(), 500);
        ledger.audit().unwrap();
    }

    #[test]
    fn claim_pays_from_reserve_and_resets() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.clock.advance(100);
        let pending = f.ledger.calculate_pending_rewards(&f.alice).unwrap();
        assert!(pending > 0);

        let applied = f.ledger.claim_rewards(f.alice).unwrap();
        assert_eq!(
            applied.events,
            vec![VaultEvent::RewardsClaimed {
                user: f.alice,
                amount: pending
            }]
        );
        assert_eq!(f.ledger.calculate_pending_rewards(&f.alice).unwrap(), 0);
        assert_eq!(f.ledger.get_deposit_info(&f.alice).last_claim_time, START + 100);
        assert_eq!(f.ledger.owner_balance(), WEI_PER_ETH - pending);
    }

    #[test]
    fn zero_claim_is_a_successful_no_op() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        let seq = f.ledger.seq();
        let applied = f.ledger.claim_rewards(f.alice).unwrap();
        assert_eq!(applied.seq, None);
        assert!(applied.events.is_empty());
        assert_eq!(f.ledger.seq(), seq);
    }

    #[test]
    fn claim_beyond_reserve_is_rejected_cleanly() {
        let f = fixture();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.clock.advance(100);
        let before = f.ledger.snapshot();
        assert!(matches!(
            f.ledger.claim_rewards(f.alice),
            Err(VaultError::InsufficientUnlockedFunds { available: 0, .. })
        ));
        assert_eq!(f.ledger.snapshot(), before);
    }

    #[test]
    fn rate_updates_are_owner_only_and_prospective() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        assert_eq!(
            f.ledger.update_reward_rate(f.alice, 1),
            Err(VaultError::Unauthorized { caller: f.alice })
        );

        f.clock.advance(10);
        let applied = f.ledger.update_reward_rate(f.owner, 200).unwrap();
        assert_eq!(
            applied.events,
            vec![VaultEvent::RewardRateUpdated {
                old_rate: 100,
                new_rate: 200
            }]
        );
        // Earned under the old rate is untouched by the change.
        assert_eq!(f.ledger.calculate_pending_rewards(&f.alice).unwrap(), 1_015);
        f.clock.advance(10);
        // 10s at 100 plus 10s at 200, with the 1.015 bonus.
        assert_eq!(f.ledger.calculate_pending_rewards(&f.alice).unwrap(), 3_045);
    }

    #[test]
    fn emergency_mode_is_owner_only_and_idempotent() {
        let f = fixture();
        assert_eq!(
            f.ledger.activate_emergency_mode(f.alice),
            Err(VaultError::Unauthorized { caller: f.alice })
        );
        let first = f.ledger.activate_emergency_mode(f.owner).unwrap();
        assert_eq!(first.events.len(), 1);
        let before = f.ledger.snapshot();

        let second = f.ledger.activate_emergency_mode(f.owner).unwrap();
        assert_eq!(second.seq, None);
        assert!(second.events.is_empty());
        assert!(f.ledger.get_emergency_mode());
        assert_eq!(f.ledger.snapshot(), before);
    }

    #[test]
    fn emergency_mode_blocks_normal_paths() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.ledger.activate_emergency_mode(f.owner).unwrap();
        f.clock.advance(DAY);

        assert_eq!(f.ledger.withdraw(f.alice), Err(VaultError::EmergencyModeActive));
        assert_eq!(f.ledger.claim_rewards(f.alice), Err(VaultError::EmergencyModeActive));
        assert_eq!(
            f.ledger.deposit(f.owner, 1, DAY),
            Err(VaultError::EmergencyModeActive)
        );
        // Top-ups are still accepted.
        f.ledger.fund_vault(f.bob, 5).unwrap();
    }

    #[test]
    fn emergency_exit_in_emergency_mode_is_free() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.clock.advance(10);
        f.ledger.activate_emergency_mode(f.owner).unwrap();

        let applied = f.ledger.emergency_withdraw(f.alice).unwrap();
        assert_eq!(
            applied.events,
            vec![VaultEvent::EmergencyWithdrawn {
                user: f.alice,
                amount: WEI_PER_ETH,
                penalty: 0,
                forfeited_rewards: 1_015,
            }]
        );
        assert_eq!(f.ledger.get_deposit_info(&f.alice).amount, 0);
        assert_eq!(f.ledger.get_total_locked(), 0);
    }

    #[test]
    fn early_exit_in_normal_mode_pays_penalty_to_owner() {
        let f = fixture();
        f.ledger.deposit(f.alice, 1_000, DAY).unwrap();
        let applied = f.ledger.emergency_withdraw(f.alice).unwrap();
        assert_eq!(
            applied.events[0],
            VaultEvent::EmergencyWithdrawn {
                user: f.alice,
                amount: 850,
                penalty: 150,
                forfeited_rewards: 0,
            }
        );
        assert_eq!(f.ledger.owner_balance(), 150);
        assert_eq!(f.ledger.vault_balance(), 150);
    }

    #[test]
    fn unlocked_exit_in_normal_mode_has_no_penalty() {
        let f = fixture();
        f.ledger.deposit(f.alice, 1_000, DAY).unwrap();
        f.clock.advance(DAY);
        let applied = f.ledger.emergency_withdraw(f.alice).unwrap();
        assert!(matches!(
            applied.events[0],
            VaultEvent::EmergencyWithdrawn { amount: 1_000, penalty: 0, .. }
        ));
    }

    #[test]
    fn fund_vault_is_open_to_anyone_and_never_touches_deposits() {
        let f = fixture();
        f.ledger.deposit(f.alice, 10, DAY).unwrap();
        let info = f.ledger.get_deposit_info(&f.alice);
        f.ledger.fund_vault(f.bob, 500).unwrap();
        assert_eq!(f.ledger.owner_balance(), 500);
        assert_eq!(f.ledger.get_deposit_info(&f.alice), info);
        assert!(matches!(
            f.ledger.fund_vault(f.bob, 0),
            Err(VaultError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn withdraw_vault_leaves_principal_alone() {
        let f = fixture();
        f.ledger.deposit(f.alice, 1_000, DAY).unwrap();
        f.ledger.fund_vault(f.bob, 400).unwrap();
        assert_eq!(
            f.ledger.withdraw_vault(f.alice),
            Err(VaultError::Unauthorized { caller: f.alice })
        );

        let applied = f.ledger.withdraw_vault(f.owner).unwrap();
        assert_eq!(
            applied.events,
            vec![VaultEvent::VaultWithdrawn {
                owner: f.owner,
                amount: 400
            }]
        );
        assert_eq!(f.ledger.vault_balance(), 1_000);
        assert_eq!(f.ledger.get_total_locked(), 1_000);
        assert!(matches!(
            f.ledger.withdraw_vault(f.owner),
            Err(VaultError::InsufficientUnlockedFunds { available: 0, .. })
        ));
    }

    #[test]
    fn clock_running_backwards_is_floored() {
        let f = funded();
        f.ledger.deposit(f.alice, WEI_PER_ETH, DAY).unwrap();
        f.clock.set(START - 1_000);
        assert_eq!(f.ledger.now(), START);
        assert_eq!(f.ledger.calculate_pending_rewards(&f.alice).unwrap(), 0);
        f.ledger.deposit(f.alice, 1, DAY).unwrap();
        f.ledger.audit().unwrap();
    }

    #[test]
    fn overflowing_deposit_is_rejected_without_change() {
        let f = fixture();
        f.ledger.deposit(f.alice, u128::MAX, DAY).unwrap();
        let before = f.ledger.snapshot();
        assert!(matches!(
            f.ledger.deposit(f.bob, 1, DAY),
            Err(VaultError::Overflow { .. })
        ));
        assert_eq!(f.ledger.snapshot(), before);
    }

    #[test]
    fn journal_refusal_leaves_state_untouched() {
        let clock = Arc::new(ManualClock::new(START));
        let journal = Arc::new(MemoryJournal::new());
        let ledger = VaultLedger::new(LedgerParams::default(), clock)
            .unwrap()
            .with_journal(journal.clone());
        let owner = Address::from_label("owner");
        ledger.initialize(owner, 100, 150).unwrap();

        journal.set_read_only(true);
        let err = ledger.deposit(owner, 10, DAY).unwrap_err();
        assert_eq!(
            err,
            VaultError::Journal(JournalError::ReadOnly.to_string())
        );
        assert_eq!(ledger.get_total_locked(), 0);
        assert_eq!(ledger.seq(), 1);

        journal.set_read_only(false);
        ledger.deposit(owner, 10, DAY).unwrap();
        assert_eq!(journal.entries().len(), 2);
        assert_eq!(journal.entries()[1].seq, 2);
    }

    #[test]
    fn replay_rebuilds_identical_state() {
        let clock = Arc::new(ManualClock::new(START));
        let journal = Arc::new(MemoryJournal::new());
        let ledger = VaultLedger::new(LedgerParams::default(), clock.clone())
            .unwrap()
            .with_journal(journal.clone());
        let owner = Address::from_label("owner");
        let alice = Address::from_label("alice");
        ledger.initialize(owner, 100, 150).unwrap();
        ledger.fund_vault(owner, WEI_PER_ETH).unwrap();
        ledger.deposit(alice, WEI_PER_ETH, DAY).unwrap();
        clock.advance(500);
        ledger.claim_rewards(alice).unwrap();
        ledger.update_reward_rate(owner, 7).unwrap();

        let replica = VaultLedger::new(LedgerParams::default(), clock.clone()).unwrap();
        assert_eq!(replica.replay(journal.entries()).unwrap(), 5);
        assert_eq!(replica.snapshot(), ledger.snapshot());
    }

    #[test]
    fn replay_detects_gaps() {
        let clock = Arc::new(ManualClock::new(START));
        let ledger = VaultLedger::new(LedgerParams::default(), clock).unwrap();
        let entry = JournalEntry {
            seq: 2,
            timestamp: START,
            caller: Address::from_label("owner"),
            operation: Operation::ActivateEmergencyMode,
        };
        assert!(matches!(
            ledger.replay(vec![entry]),
            Err(VaultError::Journal(_))
        ));
    }

    #[test]
    fn audit_passes_after_mixed_activity() {
        let f = funded();
        f.ledger.deposit(f.alice, 1_000, DAY).unwrap();
        f.ledger.deposit(f.bob, 2_000, 2 * DAY).unwrap();
        f.ledger.emergency_withdraw(f.bob).unwrap();
        f.ledger.audit().unwrap();
        assert_eq!(f.ledger.depositor_count(), 1);
    }
}
