//! # Storage Module
//!
//! Durable record of every state change the ledger accepted.
//!
//! The ledger itself is in-memory; what survives restarts is the operation
//! journal. A node rebuilds state on startup by replaying the journal into a
//! fresh [`VaultLedger`](crate::vault::VaultLedger).
//!
//! ```text
//! journal.rs - JournalEntry, the Journal trait, sled-backed JournalStore
//!              and an in-memory MemoryJournal for tests
//! ```
//!
//! Values are bincode (compact, deterministic); JSON is for the RPC surface.

pub mod journal;

pub use journal::{Journal, JournalEntry, JournalError, JournalResult, JournalStore, MemoryJournal};
