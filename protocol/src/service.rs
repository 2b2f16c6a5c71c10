//! # Submission Service
//!
//! Turns ledger operations into confirmable submissions.
//!
//! `submit` hands back a [`SubmissionId`] immediately; the operation is
//! applied in the background and its [`Receipt`] moves from `Pending` to
//! `Confirmed`, `Failed` or `NotDurable`. A receipt is only marked
//! `Confirmed` after the journal has been flushed, so a confirmed operation
//! survives a restart.
//!
//! ## Flush failures
//!
//! The ledger commits in memory before the service flushes. If the flush then
//! fails, the operation has taken effect but may not survive a restart: its
//! receipt becomes `NotDurable`, carrying the seq, events and the flush error.
//! The journal is then treated as unhealthy. Every later submission first
//! retries the flush and is rejected with [`VaultError::Journal`], without
//! being applied, until a flush succeeds again.
//!
//! ## Lanes
//!
//! Each caller gets a lane: an unbounded queue drained by one task. That gives
//! at most one in-flight mutation per caller, applied in submission order,
//! while different callers proceed concurrently. A lane that stays idle for
//! [`LANE_IDLE_TIMEOUT`] retires and frees its map entry; the caller's next
//! submission starts a fresh one.
//!
//! ```text
//! submit(alice, op) ──► lane[alice] ──► ledger.execute ──► flush ──► receipt
//! submit(bob, op)   ──► lane[bob]   ──► ledger.execute ──► flush ──► receipt
//!                                                                     │
//!                                                  broadcast ◄────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{LANE_IDLE_TIMEOUT, RECEIPT_CHANNEL_CAPACITY};
use crate::types::{Address, Timestamp};
use crate::vault::{Applied, Operation, VaultError, VaultEvent, VaultLedger};

/// Handle returned by [`VaultService::submit`].
pub type SubmissionId = Uuid;

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
    /// Applied in memory, but the journal flush failed afterwards.
    NotDurable,
}

/// Outcome of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: SubmissionId,
    pub caller: Address,
    pub operation: Operation,
    pub status: ReceiptStatus,
    pub submitted_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Journal sequence number; `None` for rejections and no-op successes.
    pub seq: Option<u64>,
    /// Ledger time the operation was evaluated at.
    pub ledger_time: Option<Timestamp>,
    pub events: Vec<VaultEvent>,
    pub error: Option<VaultError>,
    /// Why a `NotDurable` operation could not be flushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_error: Option<String>,
}

/// How a lane settled one job.
enum Outcome {
    Applied(Applied),
    NotDurable(Applied, String),
    Rejected(VaultError),
}

impl Receipt {
    fn pending(id: SubmissionId, caller: Address, operation: Operation) -> Self {
        Self {
            id,
            caller,
            operation,
            status: ReceiptStatus::Pending,
            submitted_at: Utc::now(),
            settled_at: None,
            seq: None,
            ledger_time: None,
            events: Vec::new(),
            error: None,
            flush_error: None,
        }
    }

    fn settle(&mut self, outcome: Outcome) {
        self.settled_at = Some(Utc::now());
        let applied = match outcome {
            Outcome::Applied(applied) => {
                self.status = ReceiptStatus::Confirmed;
                applied
            }
            Outcome::NotDurable(applied, reason) => {
                self.status = ReceiptStatus::NotDurable;
                self.flush_error = Some(reason);
                applied
            }
            Outcome::Rejected(err) => {
                self.status = ReceiptStatus::Failed;
                self.error = Some(err);
                return;
            }
        };
        self.seq = applied.seq;
        self.ledger_time = Some(applied.timestamp);
        self.events = applied.events;
    }

    pub fn is_settled(&self) -> bool {
        self.status != ReceiptStatus::Pending
    }

    /// Time from submission to settlement.
    pub fn latency(&self) -> Option<Duration> {
        self.settled_at
            .and_then(|settled| (settled - self.submitted_at).to_std().ok())
    }

    /// The rejection when failed, `Ok(self)` otherwise. A `NotDurable`
    /// receipt is `Ok`: its effect is visible in the ledger.
    pub fn into_result(self) -> Result<Receipt, VaultError> {
        match self.error.clone() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("unknown submission {0}")]
    UnknownSubmission(SubmissionId),

    #[error("submission {0} did not settle in time")]
    Timeout(SubmissionId),

    #[error("submission service shut down")]
    Closed,
}

// ---------------------------------------------------------------------------
// VaultService
// ---------------------------------------------------------------------------

struct Job {
    id: SubmissionId,
    operation: Operation,
}

type LaneMap = DashMap<Address, mpsc::UnboundedSender<Job>>;

/// Everything a lane task needs. Holds no lane senders, so dropping the
/// service closes every lane.
#[derive(Clone)]
struct Settler {
    ledger: Arc<VaultLedger>,
    receipts: Arc<DashMap<SubmissionId, watch::Sender<Receipt>>>,
    settled: broadcast::Sender<Receipt>,
    journal_healthy: Arc<AtomicBool>,
}

impl Settler {
    async fn run_lane(
        self,
        caller: Address,
        mut jobs: mpsc::UnboundedReceiver<Job>,
        lanes: Weak<LaneMap>,
        idle_timeout: Duration,
    ) {
        loop {
            let job = match tokio::time::timeout(idle_timeout, jobs.recv()).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => {
                    let Some(lanes) = lanes.upgrade() else { break };
                    // Submitters send while holding the entry, so an empty
                    // queue seen here stays empty once the entry is gone.
                    let mut stray = None;
                    let retired = lanes.remove_if(&caller, |_, _| match jobs.try_recv() {
                        Ok(job) => {
                            stray = Some(job);
                            false
                        }
                        Err(_) => true,
                    });
                    match stray {
                        Some(job) => job,
                        None if retired.is_some() => {
                            debug!(%caller, "idle lane retired");
                            return;
                        }
                        None => continue,
                    }
                }
            };
            self.process(caller, job).await;
        }
        debug!(%caller, "lane closed");
    }

    async fn process(&self, caller: Address, job: Job) {
        let op = job.operation.name();
        let outcome = match self.ensure_journal_healthy().await {
            Err(reason) => Outcome::Rejected(VaultError::Journal(format!(
                "journal unavailable: {}",
                reason
            ))),
            Ok(()) => match self.ledger.execute(caller, job.operation) {
                Ok(applied) if applied.changed_state() => match self.flush().await {
                    Ok(()) => Outcome::Applied(applied),
                    Err(reason) => {
                        self.journal_healthy.store(false, Ordering::SeqCst);
                        error!(%caller, op, seq = ?applied.seq, %reason, "journal flush failed; operation applied but not durable");
                        Outcome::NotDurable(applied, reason)
                    }
                },
                Ok(applied) => Outcome::Applied(applied),
                Err(err) => Outcome::Rejected(err),
            },
        };

        let Some(sender) = self.receipts.get(&job.id) else {
            return;
        };
        sender.send_modify(|receipt| receipt.settle(outcome));
        let receipt = sender.borrow().clone();
        drop(sender);

        debug!(
            id = %receipt.id,
            %caller,
            op,
            status = ?receipt.status,
            seq = ?receipt.seq,
            "submission settled"
        );
        // No subscribers is fine.
        let _ = self.settled.send(receipt);
    }

    /// Retries the flush after an earlier failure; no-op while healthy.
    async fn ensure_journal_healthy(&self) -> Result<(), String> {
        if self.journal_healthy.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.flush().await?;
        if !self.journal_healthy.swap(true, Ordering::SeqCst) {
            info!("journal flush recovered");
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), String> {
        let Some(journal) = self.ledger.journal().cloned() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || journal.flush())
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())
    }
}

/// Asynchronous front door to a [`VaultLedger`].
pub struct VaultService {
    settler: Settler,
    lanes: Arc<LaneMap>,
    lane_idle_timeout: Duration,
}

impl VaultService {
    pub fn new(ledger: Arc<VaultLedger>) -> Self {
        let (settled, _) = broadcast::channel(RECEIPT_CHANNEL_CAPACITY);
        Self {
            settler: Settler {
                ledger,
                receipts: Arc::new(DashMap::new()),
                settled,
                journal_healthy: Arc::new(AtomicBool::new(true)),
            },
            lanes: Arc::new(DashMap::new()),
            lane_idle_timeout: LANE_IDLE_TIMEOUT,
        }
    }

    /// How long a caller's lane may sit idle before it is retired.
    pub fn with_lane_idle_timeout(mut self, timeout: Duration) -> Self {
        self.lane_idle_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &Arc<VaultLedger> {
        &self.settler.ledger
    }

    /// `false` after a failed flush, until a retry succeeds.
    pub fn journal_healthy(&self) -> bool {
        self.settler.journal_healthy.load(Ordering::SeqCst)
    }

    /// Queues `operation` for `caller` and returns its handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, caller: Address, operation: Operation) -> SubmissionId {
        let id = Uuid::new_v4();
        let (sender, _) = watch::channel(Receipt::pending(id, caller, operation.clone()));
        self.settler.receipts.insert(id, sender);

        debug!(%id, %caller, op = operation.name(), "submission queued");

        // Send while holding the entry so an idle lane cannot retire between
        // the lookup and the send.
        let mut lane = self
            .lanes
            .entry(caller)
            .or_insert_with(|| self.spawn_lane(caller));
        if let Err(mpsc::error::SendError(job)) = lane.send(Job { id, operation }) {
            error!(%caller, %id, "lane task is gone, restarting it");
            *lane = self.spawn_lane(caller);
            // The new receiver is owned by the task just spawned.
            let _ = lane.send(job);
        }
        id
    }

    fn spawn_lane(&self, caller: Address) -> mpsc::UnboundedSender<Job> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.settler.clone().run_lane(
            caller,
            rx,
            Arc::downgrade(&self.lanes),
            self.lane_idle_timeout,
        ));
        tx
    }

    /// Callers with a live lane.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Current state of a submission.
    pub fn receipt(&self, id: &SubmissionId) -> Option<Receipt> {
        self.settler
            .receipts
            .get(id)
            .map(|sender| sender.borrow().clone())
    }

    /// Waits until the submission leaves `Pending`.
    pub async fn wait_for(
        &self,
        id: SubmissionId,
        timeout: Duration,
    ) -> Result<Receipt, ServiceError> {
        let mut rx = self
            .settler
            .receipts
            .get(&id)
            .map(|sender| sender.subscribe())
            .ok_or(ServiceError::UnknownSubmission(id))?;

        let settled = async move {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if current.is_settled() {
                        return Ok(current.clone());
                    }
                }
                if rx.changed().await.is_err() {
                    return Err(ServiceError::Closed);
                }
            }
        };

        tokio::time::timeout(timeout, settled)
            .await
            .map_err(|_| ServiceError::Timeout(id))?
    }

    /// Stream of receipts as they settle.
    pub fn subscribe(&self) -> broadcast::Receiver<Receipt> {
        self.settler.settled.subscribe()
    }

    /// Number of submissions not yet settled.
    pub fn pending_count(&self) -> usize {
        self.settler
            .receipts
            .iter()
            .filter(|entry| !entry.value().borrow().is_settled())
            .count()
    }

    /// Drops settled receipts older than `retention`. Returns how many went.
    pub fn prune_settled(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let before = self.settler.receipts.len();
        self.settler.receipts.retain(|_, sender| {
            let receipt = sender.borrow();
            !matches!(receipt.settled_at, Some(at) if at < cutoff)
        });
        before.saturating_sub(self.settler.receipts.len())
    }
}
