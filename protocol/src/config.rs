//! # Protocol Configuration & Constants
//!
//! Every magic number in the vault lives here: reward precision, lock-period
//! bounds, penalty rates, default ports and confirmation timings. Anything a
//! deployment may tune at runtime is collected in [`LedgerParams`]; everything
//! else is a compile-time constant.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Amount;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version of the ledger rules and the JSON-RPC contract.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// JSON-RPC version string. Anything else is rejected.
pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Reward Arithmetic
// ---------------------------------------------------------------------------

/// Fixed-point scale of `baseRewardRate`: the rate is quoted per 10^18 wei
/// of principal per second.
pub const REWARD_PRECISION: Amount = 1_000_000_000_000_000_000;

/// Basis-point denominator. 10 000 bps = 100%.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Lock duration that earns one full `timeBonusMultiplier` worth of bonus
/// basis points. One day.
pub const BONUS_REFERENCE_PERIOD: u64 = 86_400;

// ---------------------------------------------------------------------------
// Lock & Penalty Defaults
// ---------------------------------------------------------------------------

/// Shortest lock a deposit may request. One day.
pub const DEFAULT_MIN_LOCK_PERIOD: u64 = 86_400;

/// Longest lock a deposit may request. 365 days.
pub const DEFAULT_MAX_LOCK_PERIOD: u64 = 31_536_000;

/// Penalty for leaving a still-locked deposit early in normal mode. 15%.
pub const DEFAULT_EARLY_EXIT_PENALTY_BPS: u16 = 1_500;

/// Penalty for emergency withdrawals once emergency mode is on. Free exit.
pub const DEFAULT_EMERGENCY_PENALTY_BPS: u16 = 0;

// ---------------------------------------------------------------------------
// Node & Client Defaults
// ---------------------------------------------------------------------------

/// Default JSON-RPC / REST port.
pub const DEFAULT_RPC_PORT: u16 = 8645;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 8646;

/// Default RPC endpoint the client talks to.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8645";

/// How often a client polls a pending submission's receipt.
pub const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a client waits for a submission to settle before giving up.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the settled-receipt broadcast channel. Slow subscribers that
/// fall further behind than this see a lag notice instead of old receipts.
pub const RECEIPT_CHANNEL_CAPACITY: usize = 256;

/// A caller's submission lane retires after this long without work.
pub const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// LedgerParams
// ---------------------------------------------------------------------------

/// Rejected parameter combinations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("min_lock_period ({min}) exceeds max_lock_period ({max})")]
    LockRangeInverted { min: u64, max: u64 },

    #[error("{name} is {value} bps, above the {max} bps ceiling")]
    PenaltyTooHigh {
        name: &'static str,
        value: u16,
        max: u128,
    },
}

/// Deployment-level rules that are fixed for the lifetime of a ledger.
///
/// Reward rates are *not* here: those are set by `initialize` and owned by
/// the ledger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerParams {
    /// Shortest accepted lock period, in seconds.
    pub min_lock_period: u64,
    /// Longest accepted lock period, in seconds.
    pub max_lock_period: u64,
    /// Penalty on `emergencyWithdraw` in normal mode while still locked.
    pub early_exit_penalty_bps: u16,
    /// Penalty on `emergencyWithdraw` once emergency mode is active.
    pub emergency_penalty_bps: u16,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            min_lock_period: DEFAULT_MIN_LOCK_PERIOD,
            max_lock_period: DEFAULT_MAX_LOCK_PERIOD,
            early_exit_penalty_bps: DEFAULT_EARLY_EXIT_PENALTY_BPS,
            emergency_penalty_bps: DEFAULT_EMERGENCY_PENALTY_BPS,
        }
    }
}

impl LedgerParams {
    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.min_lock_period > self.max_lock_period {
            return Err(ParamsError::LockRangeInverted {
                min: self.min_lock_period,
                max: self.max_lock_period,
            });
        }
        for (name, value) in [
            ("early_exit_penalty_bps", self.early_exit_penalty_bps),
            ("emergency_penalty_bps", self.emergency_penalty_bps),
        ] {
            if value as u128 > BPS_DENOMINATOR {
                return Err(ParamsError::PenaltyTooHigh {
                    name,
                    value,
                    max: BPS_DENOMINATOR,
                });
            }
        }
        Ok(())
    }

    /// Returns `true` if `lock_period` falls inside the accepted range.
    pub fn accepts_lock_period(&self, lock_period: u64) -> bool {
        (self.min_lock_period..=self.max_lock_period).contains(&lock_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(LedgerParams::default().validate(), Ok(()));
    }

    #[test]
    fn inverted_lock_range_is_rejected() {
        let params = LedgerParams {
            min_lock_period: 10,
            max_lock_period: 5,
            ..LedgerParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(ParamsError::LockRangeInverted { min: 10, max: 5 })
        );
    }

    #[test]
    fn penalties_above_100_percent_are_rejected() {
        let params = LedgerParams {
            emergency_penalty_bps: 10_001,
            ..LedgerParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamsError::PenaltyTooHigh {
                name: "emergency_penalty_bps",
                ..
            })
        ));
    }

    #[test]
    fn lock_period_bounds_are_inclusive() {
        let params = LedgerParams::default();
        assert!(params.accepts_lock_period(DEFAULT_MIN_LOCK_PERIOD));
        assert!(params.accepts_lock_period(DEFAULT_MAX_LOCK_PERIOD));
        assert!(!params.accepts_lock_period(3_600));
        assert!(!params.accepts_lock_period(DEFAULT_MAX_LOCK_PERIOD + 1));
    }

    #[test]
    fn timing_constants_sanity() {
        assert!(CONFIRMATION_POLL_INTERVAL < DEFAULT_CONFIRMATION_TIMEOUT);
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
        assert!(DEFAULT_RPC_URL.ends_with(&DEFAULT_RPC_PORT.to_string()));
    }
}
