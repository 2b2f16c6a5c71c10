//! Client-side error types.

use std::time::Duration;

use thiserror::Error;
use timelock_protocol::rpc::{RpcError, DEV_CLOCK_DISABLED};
use timelock_protocol::{SubmissionId, VaultError};

/// Failure to parse a human-entered ETH amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,

    #[error("invalid character in amount: {0:?}")]
    InvalidDigit(char),

    #[error("more than {max} decimal places")]
    TooManyDecimals { max: usize },

    #[error("amount does not fit in 128 bits")]
    Overflow,
}

/// Everything that can go wrong between the client and a vault deployment.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A protocol-level JSON-RPC error (bad params, unknown method, ...).
    #[error(transparent)]
    Rpc(RpcError),

    /// The ledger rejected the operation or read.
    #[error("vault rejected the call: {0}")]
    Rejected(VaultError),

    #[error("unexpected response: {0}")]
    Decode(String),

    /// Applied by the ledger, but the node could not make it durable.
    #[error("submission {id} applied at seq {seq:?} but not persisted: {reason}")]
    NotDurable {
        id: SubmissionId,
        seq: Option<u64>,
        reason: String,
    },

    #[error("submission {id} did not settle within {timeout:?}")]
    Timeout { id: SubmissionId, timeout: Duration },

    #[error("the connected deployment has no dev clock")]
    DevClockUnavailable,

    #[error("invalid amount: {0}")]
    Amount(#[from] AmountParseError),

    /// A demo scenario observed something other than what it expected.
    #[error("scenario check failed: {0}")]
    Unexpected(String),
}

impl ClientError {
    /// Lifts vault rejections and dev-clock errors out of the RPC envelope.
    pub fn from_rpc(err: RpcError) -> Self {
        if let Some(vault) = err.vault_error() {
            return ClientError::Rejected(vault);
        }
        if err.code == DEV_CLOCK_DISABLED {
            return ClientError::DevClockUnavailable;
        }
        ClientError::Rpc(err)
    }

    /// The typed ledger rejection, if that is what this is.
    pub fn vault_error(&self) -> Option<&VaultError> {
        match self {
            ClientError::Rejected(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        ClientError::Decode(err.to_string())
    }
}
