//! # Vault Client
//!
//! [`VaultClient`] is bound to one caller address. Every state-changing
//! method submits an [`Operation`] and returns a [`PendingSubmission`];
//! read methods return decoded values directly.
//!
//! ```ignore
//! let alice = VaultClient::new(transport, Address::from_label("alice"));
//! let receipt = alice.deposit(parse_eth("1.5")?, 86_400).await?.confirmed().await?;
//! let pending = alice.pending_rewards(&alice.caller()).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use timelock_protocol::config::{CONFIRMATION_POLL_INTERVAL, DEFAULT_CONFIRMATION_TIMEOUT};
use timelock_protocol::rpc::{RpcMethod, SubmitParams, SubmitResult};
use timelock_protocol::vault::{DepositInfo, DepositStatus, LedgerSnapshot, RewardParameters};
use timelock_protocol::{Address, Amount, Operation, Receipt, SubmissionId, Timestamp};

use crate::error::ClientError;
use crate::pending::PendingSubmission;
use crate::transport::VaultTransport;

/// Talks to one vault deployment on behalf of one caller.
#[derive(Clone)]
pub struct VaultClient {
    transport: Arc<dyn VaultTransport>,
    caller: Address,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl VaultClient {
    pub fn new(transport: Arc<dyn VaultTransport>, caller: Address) -> Self {
        Self {
            transport,
            caller,
            confirm_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: CONFIRMATION_POLL_INTERVAL,
        }
    }

    /// How long [`PendingSubmission::confirmed`] waits before giving up.
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The same deployment and settings, acting as `caller`.
    pub fn acting_as(&self, caller: Address) -> Self {
        Self {
            caller,
            ..self.clone()
        }
    }

    pub fn caller(&self) -> Address {
        self.caller
    }

    pub fn transport(&self) -> &Arc<dyn VaultTransport> {
        &self.transport
    }

    // -- Operations ---------------------------------------------------------

    /// Submits `operation` as this client's caller.
    pub async fn submit(&self, operation: Operation) -> Result<PendingSubmission, ClientError> {
        let params = SubmitParams {
            from: self.caller,
            operation: operation.clone(),
        };
        let params = serde_json::to_value(&params).map_err(ClientError::decode)?;
        let result: SubmitResult = self.call(RpcMethod::Submit, params).await?;
        Ok(PendingSubmission::new(
            result.submission_id,
            operation,
            Arc::clone(&self.transport),
            self.poll_interval,
            self.confirm_timeout,
        ))
    }

    pub async fn initialize(
        &self,
        base_reward_rate: Amount,
        time_bonus_multiplier: Amount,
    ) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::Initialize {
            base_reward_rate,
            time_bonus_multiplier,
        })
        .await
    }

    pub async fn deposit(
        &self,
        amount: Amount,
        lock_period: u64,
    ) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::Deposit {
            amount,
            lock_period,
        })
        .await
    }

    pub async fn withdraw(&self) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::Withdraw).await
    }

    pub async fn emergency_withdraw(&self) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::EmergencyWithdraw).await
    }

    pub async fn claim_rewards(&self) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::ClaimRewards).await
    }

    pub async fn update_reward_rate(
        &self,
        new_rate: Amount,
    ) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::UpdateRewardRate { new_rate }).await
    }

    pub async fn activate_emergency_mode(&self) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::ActivateEmergencyMode).await
    }

    pub async fn fund_vault(&self, amount: Amount) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::FundVault { amount }).await
    }

    pub async fn withdraw_vault(&self) -> Result<PendingSubmission, ClientError> {
        self.submit(Operation::WithdrawVault).await
    }

    // -- Reads --------------------------------------------------------------

    pub async fn receipt(&self, id: SubmissionId) -> Result<Receipt, ClientError> {
        self.call(RpcMethod::GetReceipt, json!([id])).await
    }

    pub async fn pending_rewards(&self, account: &Address) -> Result<Amount, ClientError> {
        self.call_amount(RpcMethod::CalculatePendingRewards, json!([account]))
            .await
    }

    pub async fn deposit_info(&self, account: &Address) -> Result<DepositInfo, ClientError> {
        self.call(RpcMethod::GetDepositInfo, json!([account])).await
    }

    pub async fn deposit_status(&self, account: &Address) -> Result<DepositStatus, ClientError> {
        self.call(RpcMethod::GetDepositStatus, json!([account])).await
    }

    pub async fn total_locked(&self) -> Result<Amount, ClientError> {
        self.call_amount(RpcMethod::GetTotalLocked, Value::Null).await
    }

    pub async fn emergency_mode(&self) -> Result<bool, ClientError> {
        self.call(RpcMethod::GetEmergencyMode, Value::Null).await
    }

    pub async fn owner(&self) -> Result<Option<Address>, ClientError> {
        self.call(RpcMethod::GetOwner, Value::Null).await
    }

    pub async fn vault_balance(&self) -> Result<Amount, ClientError> {
        self.call_amount(RpcMethod::GetVaultBalance, Value::Null).await
    }

    pub async fn reward_parameters(&self) -> Result<RewardParameters, ClientError> {
        self.call(RpcMethod::GetRewardParameters, Value::Null).await
    }

    pub async fn snapshot(&self) -> Result<LedgerSnapshot, ClientError> {
        self.call(RpcMethod::Snapshot, Value::Null).await
    }

    // -- Time ---------------------------------------------------------------

    /// The deployment's ledger time.
    pub async fn now(&self) -> Result<Timestamp, ClientError> {
        self.call(RpcMethod::DevNow, Value::Null).await
    }

    /// Moves a dev clock forward. Fails with
    /// [`ClientError::DevClockUnavailable`] on a wall-clock deployment.
    pub async fn advance_time(&self, seconds: u64) -> Result<Timestamp, ClientError> {
        self.call(RpcMethod::DevAdvanceTime, json!([seconds])).await
    }

    /// Probes for a dev clock with a zero-second advance.
    pub async fn has_dev_clock(&self) -> Result<bool, ClientError> {
        match self.advance_time(0).await {
            Ok(_) => Ok(true),
            Err(ClientError::DevClockUnavailable) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // -- Plumbing -----------------------------------------------------------

    async fn call<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: Value,
    ) -> Result<T, ClientError> {
        let value = self.transport.call(method, params).await?;
        serde_json::from_value(value).map_err(ClientError::decode)
    }

    async fn call_amount(&self, method: RpcMethod, params: Value) -> Result<Amount, ClientError> {
        let raw: String = self.call(method, params).await?;
        raw.parse()
            .map_err(|e| ClientError::Decode(format!("amount {:?}: {}", raw, e)))
    }
}
