//! # Operations & Events
//!
//! [`Operation`] is the unit of work a caller submits. It is what the
//! journal records and what the RPC layer decodes from `vault_submit`.
//! [`VaultEvent`]s are emitted for every successful state change.

use serde::{Deserialize, Serialize};

use crate::types::{amount, Address, Amount, Timestamp};

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A state-changing request against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    Initialize {
        #[serde(with = "amount")]
        base_reward_rate: Amount,
        #[serde(with = "amount")]
        time_bonus_multiplier: Amount,
    },
    #[serde(rename_all = "camelCase")]
    Deposit {
        #[serde(with = "amount")]
        amount: Amount,
        lock_period: u64,
    },
    Withdraw,
    EmergencyWithdraw,
    ClaimRewards,
    #[serde(rename_all = "camelCase")]
    UpdateRewardRate {
        #[serde(with = "amount")]
        new_rate: Amount,
    },
    ActivateEmergencyMode,
    FundVault {
        #[serde(with = "amount")]
        amount: Amount,
    },
    WithdrawVault,
}

impl Operation {
    /// The operation's name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Initialize { .. } => "initialize",
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw => "withdraw",
            Operation::EmergencyWithdraw => "emergencyWithdraw",
            Operation::ClaimRewards => "claimRewards",
            Operation::UpdateRewardRate { .. } => "updateRewardRate",
            Operation::ActivateEmergencyMode => "activateEmergencyMode",
            Operation::FundVault { .. } => "fundVault",
            Operation::WithdrawVault => "withdrawVault",
        }
    }

    /// Operations gated on the caller being the owner.
    pub fn is_owner_only(&self) -> bool {
        matches!(
            self,
            Operation::UpdateRewardRate { .. }
                | Operation::ActivateEmergencyMode
                | Operation::WithdrawVault
        )
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Observable record of a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultEvent {
    #[serde(rename_all = "camelCase")]
    Initialized {
        owner: Address,
        #[serde(with = "amount")]
        base_reward_rate: Amount,
        #[serde(with = "amount")]
        time_bonus_multiplier: Amount,
    },
    #[serde(rename_all = "camelCase")]
    Deposited {
        user: Address,
        #[serde(with = "amount")]
        amount: Amount,
        unlock_time: Timestamp,
        /// `true` when the amount was added to an existing deposit.
        merged: bool,
    },
    #[serde(rename_all = "camelCase")]
    Withdrawn {
        user: Address,
        #[serde(with = "amount")]
        amount: Amount,
        #[serde(with = "amount")]
        rewards: Amount,
        /// Owed rewards the owner reserve could not cover.
        #[serde(with = "amount")]
        forfeited_rewards: Amount,
    },
    #[serde(rename_all = "camelCase")]
    EmergencyWithdrawn {
        user: Address,
        /// Principal returned after the penalty.
        #[serde(with = "amount")]
        amount: Amount,
        #[serde(with = "amount")]
        penalty: Amount,
        #[serde(with = "amount")]
        forfeited_rewards: Amount,
    },
    RewardsClaimed {
        user: Address,
        #[serde(with = "amount")]
        amount: Amount,
    },
    #[serde(rename_all = "camelCase")]
    RewardRateUpdated {
        #[serde(with = "amount")]
        old_rate: Amount,
        #[serde(with = "amount")]
        new_rate: Amount,
    },
    EmergencyModeActivated {
        by: Address,
    },
    VaultFunded {
        from: Address,
        #[serde(with = "amount")]
        amount: Amount,
    },
    VaultWithdrawn {
        owner: Address,
        #[serde(with = "amount")]
        amount: Amount,
    },
}

impl VaultEvent {
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::Initialized { .. } => "Initialized",
            VaultEvent::Deposited { .. } => "Deposited",
            VaultEvent::Withdrawn { .. } => "Withdrawn",
            VaultEvent::EmergencyWithdrawn { .. } => "EmergencyWithdrawn",
            VaultEvent::RewardsClaimed { .. } => "RewardsClaimed",
            VaultEvent::RewardRateUpdated { .. } => "RewardRateUpdated",
            VaultEvent::EmergencyModeActivated { .. } => "EmergencyModeActivated",
            VaultEvent::VaultFunded { .. } => "VaultFunded",
            VaultEvent::VaultWithdrawn { .. } => "VaultWithdrawn",
        }
    }
}

/// Result of a successfully executed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applied {
    /// Journal sequence number, or `None` when the operation succeeded
    /// without changing state (e.g. claiming zero rewards).
    pub seq: Option<u64>,
    /// Ledger time the operation was evaluated at.
    pub timestamp: Timestamp,
    pub events: Vec<VaultEvent>,
}

impl Applied {
    pub fn changed_state(&self) -> bool {
        self.seq.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_use_camel_case_tags() {
        let op = Operation::Deposit {
            amount: 5,
            lock_period: 86_400,
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["deposit"]["amount"], "5");
        assert_eq!(json["deposit"]["lockPeriod"], 86_400);

        let unit: Operation = serde_json::from_str(r#""claimRewards""#).unwrap();
        assert_eq!(unit, Operation::ClaimRewards);
        assert_eq!(unit.name(), "claimRewards");
    }

    #[test]
    fn operations_accept_numeric_amounts() {
        let op: Operation =
            serde_json::from_str(r#"{"fundVault":{"amount":1000}}"#).unwrap();
        assert_eq!(op, Operation::FundVault { amount: 1_000 });
    }

    #[test]
    fn owner_only_set() {
        assert!(Operation::WithdrawVault.is_owner_only());
        assert!(Operation::ActivateEmergencyMode.is_owner_only());
        assert!(!Operation::ClaimRewards.is_owner_only());
        assert!(!Operation::FundVault { amount: 1 }.is_owner_only());
    }

    #[test]
    fn operations_roundtrip_through_bincode() {
        let op = Operation::UpdateRewardRate { new_rate: u128::MAX };
        let bytes = bincode::serialize(&op).unwrap();
        assert_eq!(bincode::deserialize::<Operation>(&bytes).unwrap(), op);
    }
}
