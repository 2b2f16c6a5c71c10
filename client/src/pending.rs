//! Awaiting the outcome of a submitted operation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::debug;

use timelock_protocol::rpc::RpcMethod;
use timelock_protocol::{Operation, Receipt, ReceiptStatus, SubmissionId};

use crate::error::ClientError;
use crate::transport::VaultTransport;

/// A submission whose receipt may not have settled yet.
pub struct PendingSubmission {
    id: SubmissionId,
    operation: Operation,
    transport: Arc<dyn VaultTransport>,
    poll_interval: Duration,
    timeout: Duration,
}

impl PendingSubmission {
    pub(crate) fn new(
        id: SubmissionId,
        operation: Operation,
        transport: Arc<dyn VaultTransport>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            operation,
            transport,
            poll_interval,
            timeout,
        }
    }

    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Fetches the receipt once, settled or not.
    pub async fn receipt(&self) -> Result<Receipt, ClientError> {
        let value = self
            .transport
            .call(RpcMethod::GetReceipt, json!([self.id]))
            .await?;
        serde_json::from_value(value).map_err(ClientError::decode)
    }

    /// Polls until the receipt settles, whatever the outcome.
    pub async fn settled(&self) -> Result<Receipt, ClientError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let receipt = self.receipt().await?;
            if receipt.is_settled() {
                debug!(id = %self.id, op = self.operation.name(), status = ?receipt.status, "submission settled");
                return Ok(receipt);
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(ClientError::Timeout {
                    id: self.id,
                    timeout: self.timeout,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Polls until the receipt settles; a rejection comes back as
    /// [`ClientError::Rejected`] carrying the ledger's typed error, and an
    /// unflushed operation as [`ClientError::NotDurable`].
    pub async fn confirmed(self) -> Result<Receipt, ClientError> {
        let receipt = self.settled().await?;
        if receipt.status == ReceiptStatus::NotDurable {
            return Err(ClientError::NotDurable {
                id: receipt.id,
                seq: receipt.seq,
                reason: receipt.flush_error.unwrap_or_default(),
            });
        }
        receipt.into_result().map_err(ClientError::Rejected)
    }
}

impl std::fmt::Debug for PendingSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSubmission")
            .field("id", &self.id)
            .field("operation", &self.operation.name())
            .field("endpoint", &self.transport.endpoint())
            .finish()
    }
}
