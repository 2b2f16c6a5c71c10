// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Timelock Protocol: Core Library
//!
//! A time-locked, reward-accruing deposit vault. Accounts lock principal for
//! a chosen period, earn rewards that grow with both time and lock length,
//! and get their principal back once the lock expires. The owner can top up
//! the reward pool, tune the reward rate and, if something goes wrong, flip
//! the vault into a one-way emergency mode where everyone can leave early.
//!
//! ## Architecture
//!
//! - **vault**: The ledger state machine. Every invariant lives here.
//! - **storage**: The operation journal: durable, replayable, sled-backed.
//! - **service**: Async submissions with per-caller ordering and receipts.
//! - **rpc**: The JSON-RPC contract and its dispatcher.
//! - **clock**: Injected time, so tests never sleep.
//! - **types**: Addresses and amounts.
//! - **config**: Protocol constants and ledger parameters.
//!
//! ## Design Philosophy
//!
//! 1. Money math is checked. Overflow is a rejection, not a wrap.
//! 2. A rejected operation changes nothing. Not even a timestamp.
//! 3. Confirmed means durable: receipts confirm after the journal flush.
//! 4. If it touches money, it has tests. Plural.

pub mod clock;
pub mod config;
pub mod rpc;
pub mod service;
pub mod storage;
pub mod types;
pub mod vault;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::LedgerParams;
pub use service::{Receipt, ReceiptStatus, SubmissionId, VaultService};
pub use types::{Address, Amount, Timestamp};
pub use vault::{Operation, VaultError, VaultEvent, VaultLedger};
