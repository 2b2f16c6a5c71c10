//! Maps JSON-RPC calls onto a [`VaultService`].
//!
//! Shared by the node's `/rpc` route and the client's in-process transport,
//! so both speak exactly the same contract.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{RpcError, RpcMethod, RpcRequest, RpcResponse, SubmitResult};
use crate::clock::ManualClock;
use crate::config::JSONRPC_VERSION;
use crate::service::{SubmissionId, VaultService};
use crate::types::{Address, Amount};
use crate::vault::Operation;

/// JSON-RPC dispatcher for one vault deployment.
#[derive(Clone)]
pub struct RpcHandler {
    service: Arc<VaultService>,
    /// Present only when the deployment runs on a manual dev clock.
    dev_clock: Option<Arc<ManualClock>>,
}

impl RpcHandler {
    pub fn new(service: Arc<VaultService>) -> Self {
        Self {
            service,
            dev_clock: None,
        }
    }

    /// Enables `dev_advanceTime` against `clock`.
    pub fn with_dev_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.dev_clock = Some(clock);
        self
    }

    pub fn service(&self) -> &Arc<VaultService> {
        &self.service
    }

    pub fn dev_clock_enabled(&self) -> bool {
        self.dev_clock.is_some()
    }

    /// Handles one request. Never fails: errors become error responses.
    ///
    /// Must be called from within a tokio runtime (`vault_submit` spawns).
    pub fn handle(&self, request: RpcRequest) -> RpcResponse {
        if request.jsonrpc != JSONRPC_VERSION {
            return RpcResponse::error(
                request.id,
                RpcError::invalid_request(format!(
                    "jsonrpc must be \"{}\"",
                    JSONRPC_VERSION
                )),
            );
        }

        let outcome = match RpcMethod::from_name(&request.method) {
            Some(method) => self.dispatch(method, &request.params),
            None => Err(RpcError::method_not_found(&request.method)),
        };

        match outcome {
            Ok(result) => RpcResponse::success(request.id, result),
            Err(err) => {
                debug!(method = %request.method, code = err.code, message = %err.message, "rpc error");
                RpcResponse::error(request.id, err)
            }
        }
    }

    fn dispatch(&self, method: RpcMethod, params: &Value) -> Result<Value, RpcError> {
        let ledger = self.service.ledger();
        match method {
            RpcMethod::Submit => {
                let from: Address = param(params, 0, "from")?;
                let operation: Operation = param(params, 1, "operation")?;
                let submission_id = self.service.submit(from, operation);
                to_json(&SubmitResult { submission_id })
            }
            RpcMethod::GetReceipt => {
                let id: SubmissionId = param(params, 0, "submissionId")?;
                match self.service.receipt(&id) {
                    Some(receipt) => to_json(&receipt),
                    None => Err(RpcError::not_found(format!("submission {}", id))),
                }
            }
            RpcMethod::CalculatePendingRewards => {
                let account: Address = param(params, 0, "address")?;
                let pending = ledger
                    .calculate_pending_rewards(&account)
                    .map_err(|e| RpcError::vault(&e))?;
                Ok(amount_json(pending))
            }
            RpcMethod::GetDepositInfo => {
                let account: Address = param(params, 0, "address")?;
                to_json(&ledger.get_deposit_info(&account))
            }
            RpcMethod::GetDepositStatus => {
                let account: Address = param(params, 0, "address")?;
                to_json(&ledger.deposit_status(&account))
            }
            RpcMethod::GetTotalLocked => Ok(amount_json(ledger.get_total_locked())),
            RpcMethod::GetEmergencyMode => Ok(Value::Bool(ledger.get_emergency_mode())),
            RpcMethod::GetOwner => to_json(&ledger.owner()),
            RpcMethod::GetVaultBalance => Ok(amount_json(ledger.vault_balance())),
            RpcMethod::GetRewardParameters => match ledger.reward_parameters() {
                Some(params) => to_json(&params),
                None => Err(RpcError::vault(&crate::vault::VaultError::NotInitialized)),
            },
            RpcMethod::Snapshot => to_json(&ledger.snapshot()),
            RpcMethod::DevNow => Ok(Value::from(ledger.now())),
            RpcMethod::DevAdvanceTime => {
                let clock = self
                    .dev_clock
                    .as_ref()
                    .ok_or_else(RpcError::dev_clock_disabled)?;
                let seconds: u64 = param(params, 0, "seconds")?;
                clock.advance(seconds);
                Ok(Value::from(ledger.now()))
            }
        }
    }
}

/// Reads a parameter by position (array params) or by name (object params).
fn param<T: DeserializeOwned>(params: &Value, index: usize, name: &str) -> Result<T, RpcError> {
    let value = match params {
        Value::Array(items) => items.get(index),
        Value::Object(fields) => fields.get(name),
        _ => None,
    }
    .ok_or_else(|| RpcError::invalid_params(format!("missing parameter `{}`", name)))?;

    serde_json::from_value(value.clone())
        .map_err(|e| RpcError::invalid_params(format!("invalid `{}`: {}", name, e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}

fn amount_json(amount: Amount) -> Value {
    Value::String(amount.to_string())
}
