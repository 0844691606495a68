//! # Storage Module
//!
//! ```text
//! db.rs     : sled handle and tree layout
//! retry.rs  : bounded exponential backoff for commits
//! ledger.rs : transaction ledger and authorization records
//! ```

pub mod db;
pub mod ledger;
pub mod retry;

pub use db::{DbError, SettlementDb};
pub use ledger::{LedgerError, TransactionLedger};
pub use retry::RetryPolicy;
