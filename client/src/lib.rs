//! # Timelock Client
//!
//! Orchestrates a time-locked vault deployment: submits operations, waits for
//! their receipts to settle, performs reads, and ships the demo scenarios.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────────────────────┐
//! │ scenarios.rs │──►│ client.rs        │──►│ transport.rs               │
//! │ (demos)      │   │ VaultClient      │   │ HttpTransport ─► node /rpc │
//! └──────────────┘   │ pending.rs       │   │ LocalTransport (in-proc)   │
//!                    └──────────────────┘   └────────────────────────────┘
//! ```

pub mod client;
pub mod display;
pub mod error;
pub mod pending;
pub mod scenarios;
pub mod transport;

pub use client::VaultClient;
pub use error::{AmountParseError, ClientError};
pub use pending::PendingSubmission;
pub use scenarios::{Deployment, Scenario, ScenarioReport};
pub use transport::{HttpTransport, LocalTransport, VaultTransport};
