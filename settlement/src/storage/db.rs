//! # SettlementDb: Embedded Storage
//!
//! Thin wrapper over a sled database shared by the ledger and the vault.
//!
//! ## Tree Layout
//!
//! | Tree             | Key                          | Value                  |
//! |------------------|------------------------------|------------------------|
//! | `transactions`   | document id (UTF-8)          | `json(Transaction)`    |
//! | `idempotency`    | idempotency key (16B UUID)   | document id (UTF-8)    |
//! | `authorizations` | `doc \0 public_key_hex`      | `json(Authorization)`  |
//! | `submissions`    | document id (UTF-8)          | claim time (RFC 3339)  |
//!
//! Ledger records are JSON rather than bincode: decimal amounts serialize as
//! strings and must round-trip exactly.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record under key {0}")]
    Corrupt(String),
}

impl DbError {
    /// I/O failures the engine may recover from on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Sled(sled::Error::Io(e)) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

pub(crate) fn encode_json<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DbError::Serialization(e.to_string()))
}

pub(crate) fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    serde_json::from_slice(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// SettlementDb
// ---------------------------------------------------------------------------

/// Handle to the ledger database. Cheap to clone; sled trees are
/// internally reference counted and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct SettlementDb {
    db: Db,
    pub(crate) transactions: Tree,
    pub(crate) idempotency: Tree,
    pub(crate) authorizations: Tree,
    pub(crate) submissions: Tree,
}

impl SettlementDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop. Used by tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let transactions = db.open_tree("transactions")?;
        let idempotency = db.open_tree("idempotency")?;
        let authorizations = db.open_tree("authorizations")?;
        let submissions = db.open_tree("submissions")?;
        Ok(Self {
            db,
            transactions,
            idempotency,
            authorizations,
            submissions,
        })
    }

    /// Opens (creating if needed) an additional named tree.
    pub fn open_tree(&self, name: &str) -> DbResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    /// Blocks until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of ledger transaction records.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_temporary_has_empty_trees() {
        let db = SettlementDb::open_temporary().unwrap();
        assert_eq!(db.transaction_count(), 0);
        assert!(db.authorizations.is_empty());
    }

    #[test]
    fn test_reopen_on_disk_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = SettlementDb::open(dir.path()).unwrap();
            db.transactions.insert(b"doc-1", b"{}".to_vec()).unwrap();
            db.flush().unwrap();
        }
        let db = SettlementDb::open(dir.path()).unwrap();
        assert_eq!(db.transaction_count(), 1);
    }

    #[test]
    fn test_transient_classification() {
        let transient = DbError::Sled(sled::Error::Io(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "interrupted",
        )));
        assert!(transient.is_transient());

        let permanent = DbError::Sled(sled::Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )));
        assert!(!permanent.is_transient());
        assert!(!DbError::Corrupt("k".into()).is_transient());
    }
}
