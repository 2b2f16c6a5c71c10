//! # Vault Module
//!
//! The time-locked deposit ledger: who has locked what and until when, what
//! they have earned, and what the owner may take out.
//!
//! ## Architecture
//!
//! ```text
//! ledger.rs    - VaultLedger: state, transitions, reads, replay
//! deposit.rs   - per-account Deposit record and read views
//! rewards.rs   - cumulative reward index and the bonus curve
//! operation.rs - Operation (journaled input) and VaultEvent (output)
//! error.rs     - VaultError
//! ```
//!
//! ## Account lifecycle
//!
//! ```text
//! NoDeposit ──deposit──► Locked ──time──► Unlockable ──withdraw──► NoDeposit
//!                         │  ▲                  │
//!                         └──┘ deposit (merge)  │
//!                         └──────emergencyWithdraw─────────────► NoDeposit
//! ```
//!
//! Ledger-wide, `Normal → EmergencyMode` is one-way.

pub mod deposit;
pub mod error;
pub mod ledger;
pub mod operation;
pub mod rewards;

pub use deposit::{Deposit, DepositInfo, DepositState, DepositStatus};
pub use error::VaultError;
pub use ledger::{AccountDeposit, AuditError, LedgerSnapshot, RewardParameters, VaultLedger};
pub use operation::{Applied, Operation, VaultEvent};
pub use rewards::RewardSchedule;
