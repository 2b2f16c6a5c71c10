//! # Reward Accrual
//!
//! Rewards follow a cumulative-index model. The schedule keeps a running
//! `reward_index` (the integral of `baseRewardRate` over time) and each
//! deposit remembers the index value at its last settlement. Pending rewards
//! are then
//!
//! ```text
//! amount * (index(now) - index_at_settlement) / 10^18 * bonus_bps / 10 000
//! ```
//!
//! Under a constant rate this reduces to
//! `amount * rate * elapsed / 10^18 * bonus`, and a rate change only affects
//! time after the change: the index is checkpointed with the old rate first.

use serde::{Deserialize, Serialize};

use super::error::VaultError;
use crate::config::{BONUS_REFERENCE_PERIOD, BPS_DENOMINATOR, REWARD_PRECISION};
use crate::types::{amount, Amount, Timestamp};

/// Ledger-wide reward parameters plus the running index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSchedule {
    /// Reward wei per 10^18 wei of principal per second.
    #[serde(with = "amount")]
    pub base_reward_rate: Amount,
    /// Bonus basis points earned per day of lock.
    #[serde(with = "amount")]
    pub time_bonus_multiplier: Amount,
    /// Accumulated `rate * seconds` up to `index_updated_at`.
    #[serde(with = "amount")]
    pub reward_index: u128,
    /// When `reward_index` was last brought up to date.
    pub index_updated_at: Timestamp,
}

impl RewardSchedule {
    /// Starts a schedule with an index of zero at `now`.
    pub fn new(base_reward_rate: Amount, time_bonus_multiplier: Amount, now: Timestamp) -> Self {
        Self {
            base_reward_rate,
            time_bonus_multiplier,
            reward_index: 0,
            index_updated_at: now,
        }
    }

    /// The index value at `now`, without mutating the schedule.
    ///
    /// Times before `index_updated_at` count as zero elapsed.
    pub fn index_at(&self, now: Timestamp) -> Result<u128, VaultError> {
        let elapsed = now.saturating_sub(self.index_updated_at) as u128;
        self.base_reward_rate
            .checked_mul(elapsed)
            .and_then(|growth| growth.checked_add(self.reward_index))
            .ok_or_else(|| VaultError::overflow("reward index"))
    }

    /// Replaces the base rate from `now` on and returns the old rate.
    ///
    /// Accrual up to `now` is folded into the index at the old rate.
    pub fn set_rate(&mut self, new_rate: Amount, now: Timestamp) -> Result<Amount, VaultError> {
        let index = self.index_at(now)?;
        let old = self.base_reward_rate;
        self.reward_index = index;
        self.index_updated_at = self.index_updated_at.max(now);
        self.base_reward_rate = new_rate;
        Ok(old)
    }
}

/// Bonus factor in basis points for a given lock period.
///
/// `10 000 + multiplier * lock_period / 86 400`, so a zero lock earns exactly
/// the base rate and the factor never decreases as the lock grows.
pub fn bonus_factor_bps(time_bonus_multiplier: Amount, lock_period: u64) -> Result<u128, VaultError> {
    time_bonus_multiplier
        .checked_mul(lock_period as u128)
        .map(|scaled| scaled / BONUS_REFERENCE_PERIOD as u128)
        .and_then(|bonus| bonus.checked_add(BPS_DENOMINATOR))
        .ok_or_else(|| VaultError::overflow("time bonus"))
}

/// `a * b / d` rounded down, or `None` if the quotient itself does not fit.
///
/// Splits both factors by `d` when the direct product would overflow, so the
/// only intermediate left is `(a % d) * (b % d) < d^2`. `d` must be below 2^64.
pub(crate) fn mul_div(a: u128, b: u128, d: u128) -> Option<u128> {
    if let Some(product) = a.checked_mul(b) {
        return Some(product / d);
    }
    let (a_quot, a_rem) = (a / d, a % d);
    let (b_quot, b_rem) = (b / d, b % d);
    a_quot
        .checked_mul(b)?
        .checked_add(a_rem.checked_mul(b_quot)?)?
        .checked_add(a_rem.checked_mul(b_rem)? / d)
}

/// Reward earned by `principal` over an index delta, including the lock bonus.
pub fn accrue(
    principal: Amount,
    index_delta: u128,
    lock_period: u64,
    time_bonus_multiplier: Amount,
) -> Result<Amount, VaultError> {
    if principal == 0 || index_delta == 0 {
        return Ok(0);
    }
    let base = mul_div(principal, index_delta, REWARD_PRECISION)
        .ok_or_else(|| VaultError::overflow("base reward"))?;
    let bonus = bonus_factor_bps(time_bonus_multiplier, lock_period)?;
    mul_div(base, bonus, BPS_DENOMINATOR).ok_or_else(|| VaultError::overflow("boosted reward"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WEI_PER_ETH;

    #[test]
    fn bonus_grows_with_lock_period() {
        assert_eq!(bonus_factor_bps(150, 0).unwrap(), 10_000);
        assert_eq!(bonus_factor_bps(150, 86_400).unwrap(), 10_150);
        assert_eq!(bonus_factor_bps(150, 2 * 86_400).unwrap(), 10_300);
        assert!(bonus_factor_bps(150, 86_401).unwrap() >= bonus_factor_bps(150, 86_400).unwrap());
    }

    #[test]
    fn one_eth_for_ten_seconds_at_rate_100() {
        let schedule = RewardSchedule::new(100, 150, 1_000);
        let delta = schedule.index_at(1_010).unwrap();
        assert_eq!(delta, 1_000);
        // 1e18 * 1000 / 1e18 = 1000 base, * 1.015 bonus.
        assert_eq!(accrue(WEI_PER_ETH, delta, 86_400, 150).unwrap(), 1_015);
    }

    #[test]
    fn rate_change_only_affects_later_time() {
        let mut schedule = RewardSchedule::new(100, 0, 0);
        let old = schedule.set_rate(300, 10).unwrap();
        assert_eq!(old, 100);
        // 10s at 100 + 5s at 300.
        assert_eq!(schedule.index_at(15).unwrap(), 1_000 + 1_500);
    }

    #[test]
    fn backwards_time_counts_as_zero_elapsed() {
        let schedule = RewardSchedule::new(100, 0, 50);
        assert_eq!(schedule.index_at(10).unwrap(), 0);
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let schedule = RewardSchedule::new(u128::MAX, 0, 0);
        assert!(matches!(
            schedule.index_at(2),
            Err(VaultError::Overflow { .. })
        ));
        assert!(matches!(
            accrue(u128::MAX, u128::MAX, 0, 0),
            Err(VaultError::Overflow { .. })
        ));
    }

    #[test]
    fn mul_div_matches_the_direct_product() {
        assert_eq!(mul_div(7, 9, 4), Some(15));
        assert_eq!(mul_div(WEI_PER_ETH, 1_000, REWARD_PRECISION), Some(1_000));
        // (2^127 + 3) * 10 / 10^18 needs more than 128 bits in the middle.
        let a = (1u128 << 127) + 3;
        assert_eq!(
            mul_div(a, 10, REWARD_PRECISION),
            Some(a / REWARD_PRECISION * 10 + (a % REWARD_PRECISION) * 10 / REWARD_PRECISION)
        );
        assert_eq!(mul_div(u128::MAX, u128::MAX, REWARD_PRECISION), None);
    }

    #[test]
    fn large_principal_accrues_without_overflow() {
        // One million ETH over five days at rate 1e9.
        let principal = 1_000_000 * WEI_PER_ETH;
        let delta = 1_000_000_000u128 * 5 * 86_400;
        assert!(principal.checked_mul(delta).is_none());

        let reward = accrue(principal, delta, 86_400, 150).unwrap();
        // 10^6 * 4.32e14 base, * 1.015 bonus.
        assert_eq!(reward, 1_000_000 * delta * 10_150 / 10_000);
    }

    #[test]
    fn zero_principal_earns_nothing() {
        assert_eq!(accrue(0, 1_000_000, 86_400, 150).unwrap(), 0);
    }
}
