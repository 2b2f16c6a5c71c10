//! # Operation Journal
//!
//! Append-only log of applied operations, built on sled.
//!
//! ## Tree Layout
//!
//! | Tree       | Key              | Value                  |
//! |------------|------------------|------------------------|
//! | `journal`  | `seq` (8B BE)    | `bincode(JournalEntry)`|
//! | `metadata` | key (UTF-8)      | value (bytes)          |
//!
//! Sequence numbers are big-endian so sled's lexicographic order matches
//! numeric order and a range scan yields entries in application order.
//!
//! An entry and the `latest_seq` marker are written in one sled transaction.
//! Appends are buffered; [`Journal::flush`] makes them durable.

use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

use crate::types::{Address, Timestamp};
use crate::vault::Operation;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("out-of-order append: expected seq {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("journal is read-only")]
    ReadOnly,

    #[error("corrupt journal: {0}")]
    Corrupt(String),
}

pub type JournalResult<T> = Result<T, JournalError>;

// ---------------------------------------------------------------------------
// Entry & Trait
// ---------------------------------------------------------------------------

/// One applied operation, exactly as the ledger evaluated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    /// Ledger time the operation was applied at. Replay feeds this back in
    /// instead of reading a clock.
    pub timestamp: Timestamp,
    pub caller: Address,
    pub operation: Operation,
}

/// Sink for applied operations.
///
/// `append` is called under the ledger's write lock and must not block on
/// anything but local storage. Implementations reject appends whose `seq`
/// does not directly follow the last one.
pub trait Journal: Send + Sync + fmt::Debug {
    fn append(&self, entry: &JournalEntry) -> JournalResult<()>;

    /// Makes every appended entry durable.
    fn flush(&self) -> JournalResult<()>;

    /// Sequence number of the last appended entry, 0 when empty.
    fn latest_seq(&self) -> JournalResult<u64>;
}

// ---------------------------------------------------------------------------
// JournalStore
// ---------------------------------------------------------------------------

const META_LATEST_SEQ: &[u8] = b"latest_seq";

/// sled-backed journal.
///
/// Cloning shares the underlying database handle.
#[derive(Debug, Clone)]
pub struct JournalStore {
    db: Db,
    entries: Tree,
    metadata: Tree,
}

impl JournalStore {
    /// Opens or creates a journal at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> JournalResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A journal that is deleted when the last handle drops.
    pub fn open_temporary() -> JournalResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> JournalResult<Self> {
        let entries = db.open_tree("journal")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            entries,
            metadata,
        })
    }

    /// Fetches a single entry.
    pub fn get(&self, seq: u64) -> JournalResult<Option<JournalEntry>> {
        match self.entries.get(seq.to_be_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// All entries with `seq >= from`, in order.
    pub fn entries_from(&self, from: u64) -> JournalResult<Vec<JournalEntry>> {
        let mut out = Vec::new();
        for item in self.entries.range(from.to_be_bytes()..) {
            let (_key, value) = item?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// Every entry, in order. Used for replay on startup.
    pub fn load_all(&self) -> JournalResult<Vec<JournalEntry>> {
        self.entries_from(1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Async flush for callers on a tokio runtime.
    pub async fn flush_async(&self) -> JournalResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Bytes the database occupies on disk.
    pub fn size_on_disk(&self) -> JournalResult<u64> {
        Ok(self.db.size_on_disk()?)
    }
}

impl Journal for JournalStore {
    fn append(&self, entry: &JournalEntry) -> JournalResult<()> {
        let expected = self.latest_seq()? + 1;
        if entry.seq != expected {
            return Err(JournalError::OutOfOrder {
                expected,
                got: entry.seq,
            });
        }

        let key = entry.seq.to_be_bytes();
        let value =
            bincode::serialize(entry).map_err(|e| JournalError::Serialization(e.to_string()))?;

        let result: Result<(), TransactionError<()>> = (&self.entries, &self.metadata)
            .transaction(|(entries, metadata)| {
                entries.insert(&key[..], value.as_slice())?;
                metadata.insert(META_LATEST_SEQ, &key[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Storage(e)) => Err(JournalError::Sled(e)),
            Err(TransactionError::Abort(())) => {
                Err(JournalError::Corrupt("append transaction aborted".to_string()))
            }
        }
    }

    fn flush(&self) -> JournalResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn latest_seq(&self) -> JournalResult<u64> {
        match self.metadata.get(META_LATEST_SEQ)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| JournalError::Corrupt("invalid latest_seq bytes".to_string()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }
}

fn decode(bytes: &[u8]) -> JournalResult<JournalEntry> {
    bincode::deserialize(bytes).map_err(|e| JournalError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// MemoryJournal
// ---------------------------------------------------------------------------

/// In-memory journal for tests and throwaway ledgers.
///
/// Can be switched read-only to exercise the "append refused" path.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
    read_only: std::sync::atomic::AtomicBool,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only
            .store(read_only, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, entry: &JournalEntry) -> JournalResult<()> {
        if self.read_only.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(JournalError::ReadOnly);
        }
        let mut entries = self.entries.lock();
        let expected = entries.last().map_or(1, |last| last.seq + 1);
        if entry.seq != expected {
            return Err(JournalError::OutOfOrder {
                expected,
                got: entry.seq,
            });
        }
        entries.push(entry.clone());
        Ok(())
    }

    fn flush(&self) -> JournalResult<()> {
        Ok(())
    }

    fn latest_seq(&self) -> JournalResult<u64> {
        Ok(self.entries.lock().last().map_or(0, |last| last.seq))
    }
}
