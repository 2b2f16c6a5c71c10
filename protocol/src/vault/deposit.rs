//! Per-account deposit records and their read-only views.

use serde::{Deserialize, Serialize};

use super::error::VaultError;
use super::rewards::{accrue, RewardSchedule};
use crate::types::{amount, Amount, Timestamp};

/// One account's position in the vault.
///
/// An account with zero principal has no record at all; the ledger removes
/// the entry on withdrawal instead of keeping a zeroed struct around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    #[serde(with = "amount")]
    pub amount: Amount,
    pub deposit_time: Timestamp,
    pub lock_period: u64,
    pub last_claim_time: Timestamp,
    /// Rewards settled into the record but not yet paid out (from merges).
    #[serde(with = "amount")]
    pub accrued_rewards: Amount,
    /// Schedule index at the last settlement.
    #[serde(with = "amount")]
    pub reward_index: u128,
}

impl Deposit {
    /// Earliest time `withdraw` is allowed.
    pub fn unlock_time(&self) -> Timestamp {
        self.deposit_time.saturating_add(self.lock_period)
    }

    pub fn is_unlocked(&self, now: Timestamp) -> bool {
        now >= self.unlock_time()
    }

    /// Rewards owed at `now`: settled rewards plus accrual since the last
    /// settlement, bonus included.
    pub fn pending_rewards(
        &self,
        schedule: &RewardSchedule,
        now: Timestamp,
    ) -> Result<Amount, VaultError> {
        let index = schedule.index_at(now)?;
        let fresh = accrue(
            self.amount,
            index.saturating_sub(self.reward_index),
            self.lock_period,
            schedule.time_bonus_multiplier,
        )?;
        self.accrued_rewards
            .checked_add(fresh)
            .ok_or_else(|| VaultError::overflow("pending rewards"))
    }

    pub fn info(&self) -> DepositInfo {
        DepositInfo {
            amount: self.amount,
            deposit_time: self.deposit_time,
            lock_period: self.lock_period,
            last_claim_time: self.last_claim_time,
        }
    }
}

/// The public `getDepositInfo` view. All zeros for an account with no deposit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    #[serde(with = "amount")]
    pub amount: Amount,
    pub deposit_time: Timestamp,
    pub lock_period: u64,
    pub last_claim_time: Timestamp,
}

impl DepositInfo {
    /// `(amount, depositTime, lockPeriod, lastClaimTime)`.
    pub fn as_tuple(&self) -> (Amount, Timestamp, u64, Timestamp) {
        (
            self.amount,
            self.deposit_time,
            self.lock_period,
            self.last_claim_time,
        )
    }

    pub fn unlock_time(&self) -> Timestamp {
        self.deposit_time.saturating_add(self.lock_period)
    }
}

/// Lifecycle of an account's deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepositState {
    NoDeposit,
    Locked,
    Unlockable,
}

/// Lifecycle state plus the unlock time, when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositStatus {
    pub status: DepositState,
    pub unlock_time: Option<Timestamp>,
}

impl DepositStatus {
    pub fn of(deposit: Option<&Deposit>, now: Timestamp) -> Self {
        match deposit {
            None => Self {
                status: DepositState::NoDeposit,
                unlock_time: None,
            },
            Some(d) => Self {
                status: if d.is_unlocked(now) {
                    DepositState::Unlockable
                } else {
                    DepositState::Locked
                },
                unlock_time: Some(d.unlock_time()),
            },
        }
    }
}
