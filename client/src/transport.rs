//! # Transports
//!
//! A [`VaultTransport`] carries one JSON-RPC call to a vault deployment and
//! brings back its result.
//!
//! - [`HttpTransport`] talks to a running `timelock-node` over HTTP.
//! - [`LocalTransport`] hosts a private ledger, submission service and manual
//!   clock in-process, so demos and tests run without a node.
//!
//! Both go through the same [`RpcHandler`] contract, so a scenario that
//! passes locally exercises exactly the calls it makes against a node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use timelock_protocol::config::{ParamsError, JSONRPC_VERSION};
use timelock_protocol::rpc::{RpcHandler, RpcMethod, RpcRequest, RpcResponse};
use timelock_protocol::{Clock, LedgerParams, ManualClock, SystemClock, VaultLedger, VaultService};

use crate::error::ClientError;

/// Sends JSON-RPC calls to one vault deployment.
#[async_trait]
pub trait VaultTransport: Send + Sync {
    /// Performs `method` and returns its `result`, or the lifted error.
    async fn call(&self, method: RpcMethod, params: Value) -> Result<Value, ClientError>;

    /// Short human-readable description of the endpoint.
    fn endpoint(&self) -> String;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// JSON-RPC over HTTP against a node's `/rpc` route.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// `base_url` is the node's API root, e.g. `http://127.0.0.1:8645`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            rpc_url: format!("{}/rpc", base_url.trim_end_matches('/')),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl VaultTransport for HttpTransport {
    async fn call(&self, method: RpcMethod, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(Value::from(id), method, params);
        trace!(id, method = method.as_str(), url = %self.rpc_url, "rpc call");

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.jsonrpc != JSONRPC_VERSION {
            return Err(ClientError::Decode(format!(
                "unexpected jsonrpc version {:?}",
                response.jsonrpc
            )));
        }
        response.into_result().map_err(ClientError::from_rpc)
    }

    fn endpoint(&self) -> String {
        self.rpc_url.clone()
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// A private, in-memory deployment with a dev clock.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct LocalTransport {
    handler: RpcHandler,
    clock: Arc<ManualClock>,
}

impl LocalTransport {
    /// A fresh, uninitialized ledger whose clock starts at `start`.
    pub fn new(params: LedgerParams, start: u64) -> Result<Self, ParamsError> {
        let clock = Arc::new(ManualClock::new(start));
        let ledger = VaultLedger::new(params, clock.clone())?;
        let service = Arc::new(VaultService::new(Arc::new(ledger)));
        Ok(Self {
            handler: RpcHandler::new(service).with_dev_clock(clock.clone()),
            clock,
        })
    }

    /// A fresh ledger whose clock starts at the current wall-clock time.
    pub fn starting_now(params: LedgerParams) -> Result<Self, ParamsError> {
        Self::new(params, SystemClock.now())
    }

    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    pub fn service(&self) -> &Arc<VaultService> {
        self.handler.service()
    }
}

#[async_trait]
impl VaultTransport for LocalTransport {
    async fn call(&self, method: RpcMethod, params: Value) -> Result<Value, ClientError> {
        let request = RpcRequest::new(Value::Null, method, params);
        self.handler
            .handle(request)
            .into_result()
            .map_err(ClientError::from_rpc)
    }

    fn endpoint(&self) -> String {
        "in-process ledger".to_string()
    }
}
