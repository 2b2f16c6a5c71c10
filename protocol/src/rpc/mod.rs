//! # JSON-RPC Contract
//!
//! Request/response types, the method table and error codes shared by the
//! node (server side) and the client (caller side). The dispatcher that maps
//! methods onto a [`VaultService`](crate::service::VaultService) lives in
//! [`handler`].
//!
//! Methods are prefixed `vault_` (ledger) or `dev_` (test clock).
//!
//! ## Method Index
//!
//! | Method                          | Params                 | Result              |
//! |---------------------------------|------------------------|---------------------|
//! | `vault_submit`                  | `{from, operation}`    | `{submissionId}`    |
//! | `vault_getReceipt`              | `[submissionId]`       | `Receipt`           |
//! | `vault_calculatePendingRewards` | `[address]`            | amount              |
//! | `vault_getDepositInfo`          | `[address]`            | `DepositInfo`       |
//! | `vault_getDepositStatus`        | `[address]`            | `DepositStatus`     |
//! | `vault_getTotalLocked`          | none                   | amount              |
//! | `vault_getEmergencyMode`        | none                   | bool                |
//! | `vault_getOwner`                | none                   | address or null     |
//! | `vault_getVaultBalance`         | none                   | amount              |
//! | `vault_getRewardParameters`     | none                   | `RewardParameters`  |
//! | `vault_snapshot`                | none                   | `LedgerSnapshot`    |
//! | `dev_now`                       | none                   | ledger time         |
//! | `dev_advanceTime`               | `[seconds]`            | new ledger time     |
//!
//! Amounts are decimal strings.

pub mod handler;

use serde::{Deserialize, Serialize};

use crate::config::JSONRPC_VERSION;
use crate::service::SubmissionId;
use crate::types::Address;
use crate::vault::{Operation, VaultError};

pub use handler::RpcHandler;

// ---------------------------------------------------------------------------
// Error Codes
// ---------------------------------------------------------------------------

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// The ledger rejected the call; `data` holds the serialized `VaultError`.
pub const VAULT_REJECTED: i32 = -32000;
pub const NOT_FOUND: i32 = -32001;
pub const DEV_CLOCK_DISABLED: i32 = -32002;

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcMethod {
    #[serde(rename = "vault_submit")]
    Submit,
    #[serde(rename = "vault_getReceipt")]
    GetReceipt,
    #[serde(rename = "vault_calculatePendingRewards")]
    CalculatePendingRewards,
    #[serde(rename = "vault_getDepositInfo")]
    GetDepositInfo,
    #[serde(rename = "vault_getDepositStatus")]
    GetDepositStatus,
    #[serde(rename = "vault_getTotalLocked")]
    GetTotalLocked,
    #[serde(rename = "vault_getEmergencyMode")]
    GetEmergencyMode,
    #[serde(rename = "vault_getOwner")]
    GetOwner,
    #[serde(rename = "vault_getVaultBalance")]
    GetVaultBalance,
    #[serde(rename = "vault_getRewardParameters")]
    GetRewardParameters,
    #[serde(rename = "vault_snapshot")]
    Snapshot,
    #[serde(rename = "dev_now")]
    DevNow,
    #[serde(rename = "dev_advanceTime")]
    DevAdvanceTime,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 13] = [
        RpcMethod::Submit,
        RpcMethod::GetReceipt,
        RpcMethod::CalculatePendingRewards,
        RpcMethod::GetDepositInfo,
        RpcMethod::GetDepositStatus,
        RpcMethod::GetTotalLocked,
        RpcMethod::GetEmergencyMode,
        RpcMethod::GetOwner,
        RpcMethod::GetVaultBalance,
        RpcMethod::GetRewardParameters,
        RpcMethod::Snapshot,
        RpcMethod::DevNow,
        RpcMethod::DevAdvanceTime,
    ];

    /// Wire name, e.g. `"vault_submit"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::Submit => "vault_submit",
            RpcMethod::GetReceipt => "vault_getReceipt",
            RpcMethod::CalculatePendingRewards => "vault_calculatePendingRewards",
            RpcMethod::GetDepositInfo => "vault_getDepositInfo",
            RpcMethod::GetDepositStatus => "vault_getDepositStatus",
            RpcMethod::GetTotalLocked => "vault_getTotalLocked",
            RpcMethod::GetEmergencyMode => "vault_getEmergencyMode",
            RpcMethod::GetOwner => "vault_getOwner",
            RpcMethod::GetVaultBalance => "vault_getVaultBalance",
            RpcMethod::GetRewardParameters => "vault_getRewardParameters",
            RpcMethod::Snapshot => "vault_snapshot",
            RpcMethod::DevNow => "dev_now",
            RpcMethod::DevAdvanceTime => "dev_advanceTime",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
///
/// `method` stays a string so unknown methods reach the dispatcher and get a
/// proper -32601 instead of failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: serde_json::Value, method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.as_str().to_string(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Collapses the envelope into the result or the error.
    ///
    /// A response with neither set yields `null`, which is what the
    /// `vault_getOwner` of an uninitialized ledger returns anyway.
    pub fn into_result(self) -> Result<serde_json::Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

// ---------------------------------------------------------------------------
// RPC Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, msg)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {}", method))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(NOT_FOUND, format!("not found: {}", what.into()))
    }

    pub fn dev_clock_disabled() -> Self {
        Self::new(
            DEV_CLOCK_DISABLED,
            "dev clock disabled: start the node with --dev-clock",
        )
    }

    /// Wraps a ledger rejection, keeping the typed error in `data`.
    pub fn vault(err: &VaultError) -> Self {
        Self {
            code: VAULT_REJECTED,
            message: err.to_string(),
            data: serde_json::to_value(err).ok(),
        }
    }

    /// Recovers the ledger rejection from a `-32000` error.
    pub fn vault_error(&self) -> Option<VaultError> {
        if self.code != VAULT_REJECTED {
            return None;
        }
        self.data
            .clone()
            .and_then(|data| serde_json::from_value(data).ok())
    }
}

// ---------------------------------------------------------------------------
// Typed Payloads
// ---------------------------------------------------------------------------

/// Params of `vault_submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitParams {
    pub from: Address,
    pub operation: Operation,
}

/// Result of `vault_submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub submission_id: SubmissionId,
}
