//! Ledger rejections.
//!
//! Every variant describes a clean, side-effect-free refusal of a single
//! operation. The enum is serde-serializable so a client can recover the
//! exact rejection kind from a receipt or an RPC error payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{amount, Address, Amount, Timestamp};

/// Errors returned by [`VaultLedger`](super::VaultLedger) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum VaultError {
    /// The caller is not the owner and the operation is owner-only.
    #[error("caller {caller} is not the vault owner")]
    Unauthorized { caller: Address },

    /// `initialize` was called on an initialized ledger.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// The ledger has not been initialized yet.
    #[error("vault has not been initialized")]
    NotInitialized,

    /// A numeric or address input is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// `withdraw` was called before the deposit's unlock time.
    #[error("funds are locked until {unlock_time} (now {now})")]
    StillLocked {
        unlock_time: Timestamp,
        now: Timestamp,
    },

    /// The account has no principal in the vault.
    #[error("account {account} has no active deposit")]
    NoDeposit { account: Address },

    /// The operation is disabled once emergency mode is on.
    #[error("operation not allowed while emergency mode is active")]
    EmergencyModeActive,

    /// Paying out would dip into locked user principal.
    #[error("insufficient unlocked funds: requested {requested}, available {available}")]
    InsufficientUnlockedFunds {
        #[serde(with = "amount")]
        requested: Amount,
        #[serde(with = "amount")]
        available: Amount,
    },

    /// Checked arithmetic would have wrapped.
    #[error("arithmetic overflow computing {context}")]
    Overflow { context: String },

    /// The journal refused the operation; nothing was applied.
    #[error("journal error: {0}")]
    Journal(String),
}

impl VaultError {
    /// Stable short name, used as a metrics label and in console output.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::Unauthorized { .. } => "Unauthorized",
            VaultError::AlreadyInitialized => "AlreadyInitialized",
            VaultError::NotInitialized => "NotInitialized",
            VaultError::InvalidParameter { .. } => "InvalidParameter",
            VaultError::StillLocked { .. } => "StillLocked",
            VaultError::NoDeposit { .. } => "NoDeposit",
            VaultError::EmergencyModeActive => "EmergencyModeActive",
            VaultError::InsufficientUnlockedFunds { .. } => "InsufficientUnlockedFunds",
            VaultError::Overflow { .. } => "Overflow",
            VaultError::Journal(_) => "Journal",
        }
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        VaultError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn overflow(context: &str) -> Self {
        VaultError::Overflow {
            context: context.to_string(),
        }
    }
}
