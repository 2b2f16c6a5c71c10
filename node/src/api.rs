//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the vault node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/health`              | Liveness probe                       |
//! | GET    | `/status`              | Ledger summary                       |
//! | POST   | `/rpc`                 | JSON-RPC 2.0 gateway                 |
//! | GET    | `/ws`                  | WebSocket stream of settled receipts |
//! | GET    | `/deposits/:address`   | Deposit record, status and rewards   |
//! | GET    | `/receipts/:id`        | Receipt of one submission            |

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use timelock_protocol::rpc::{RpcError, RpcHandler, RpcMethod, RpcRequest, RpcResponse};
use timelock_protocol::types::{amount, Address, Amount, Timestamp};
use timelock_protocol::vault::{DepositInfo, DepositStatus};
use timelock_protocol::SubmissionId;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// JSON-RPC dispatcher over the node's ledger and submission service.
    pub rpc: RpcHandler,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured RPC port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/deposits/:address", get(deposit_handler))
        .route("/receipts/:id", get(receipt_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Ledger time used for lock and reward checks.
    pub ledger_time: Timestamp,
    /// Sequence number of the last journaled operation.
    pub journal_seq: u64,
    pub owner: Option<Address>,
    #[serde(with = "amount")]
    pub total_locked: Amount,
    #[serde(with = "amount")]
    pub owner_balance: Amount,
    #[serde(with = "amount")]
    pub vault_balance: Amount,
    pub emergency_mode: bool,
    pub depositors: usize,
    /// Submissions accepted but not yet settled.
    pub pending_submissions: usize,
    /// `false` after a journal flush failure, until a retry succeeds.
    pub journal_healthy: bool,
    /// Whether `dev_advanceTime` is available.
    pub dev_clock: bool,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /deposits/:address`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub address: Address,
    pub deposit: DepositInfo,
    pub status: DepositStatus,
    /// `None` while the ledger is uninitialized.
    #[serde(with = "optional_amount")]
    pub pending_rewards: Option<Amount>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

mod optional_amount {
    use serde::{Deserialize, Deserializer, Serializer};
    use timelock_protocol::types::Amount;

    pub fn serialize<S: Serializer>(value: &Option<Amount>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(&v.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Amount>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .transpose()
    }
}

fn bad_request(error: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: returns a ledger summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let service = state.rpc.service();
    let snapshot = service.ledger().snapshot();

    Json(StatusResponse {
        version: state.version.clone(),
        ledger_time: snapshot.timestamp,
        journal_seq: snapshot.seq,
        owner: snapshot.owner,
        total_locked: snapshot.total_locked,
        owner_balance: snapshot.owner_balance,
        vault_balance: snapshot.vault_balance,
        emergency_mode: snapshot.emergency_mode,
        depositors: snapshot.deposits.len(),
        pending_submissions: service.pending_count(),
        journal_healthy: service.journal_healthy(),
        dev_clock: state.rpc.dev_clock_enabled(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /rpc`: JSON-RPC 2.0 gateway.
///
/// Always answers 200 with a JSON-RPC envelope; a body that does not parse
/// as a request gets -32600.
async fn rpc_handler(
    State(state): State<AppState>,
    body: Result<Json<RpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return Json(RpcResponse::error(
                serde_json::Value::Null,
                RpcError::invalid_request(rejection.body_text()),
            ));
        }
    };

    let is_submit = RpcMethod::from_name(&request.method) == Some(RpcMethod::Submit);
    let response = state.rpc.handle(request);
    if is_submit && response.error.is_none() {
        state.metrics.submissions_total.inc();
    }
    Json(response)
}

/// `GET /deposits/:address`: deposit record, lifecycle status and pending rewards.
async fn deposit_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> axum::response::Response {
    let address: Address = match address.parse() {
        Ok(a) => a,
        Err(e) => return bad_request(format!("invalid address: {}", e)),
    };

    let ledger = state.rpc.service().ledger();
    Json(DepositResponse {
        address,
        deposit: ledger.get_deposit_info(&address),
        status: ledger.deposit_status(&address),
        pending_rewards: ledger.calculate_pending_rewards(&address).ok(),
    })
    .into_response()
}

/// `GET /receipts/:id`: receipt of one submission, 404 once pruned.
async fn receipt_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> axum::response::Response {
    let id: SubmissionId = match id.parse() {
        Ok(id) => id,
        Err(e) => return bad_request(format!("invalid submission id: {}", e)),
    };

    match state.rpc.service().receipt(&id) {
        Some(receipt) => Json(receipt).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("submission {} not found", id),
            }),
        )
            .into_response(),
    }
}

/// `GET /ws`: upgrades to a WebSocket that pushes every settled receipt.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding settled receipts
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.rpc.service().subscribe();

    loop {
        tokio::select! {
            receipt = rx.recv() => {
                match receipt {
                    Ok(receipt) => {
                        let payload = match serde_json::to_string(&receipt) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize receipt: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} receipts", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    // Push-only channel; client messages are ignored.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
