//! # Transaction Ledger
//!
//! Durable, auditable record of payout transactions and the authorizations
//! collected for them. Every mutating call runs as one sled multi-tree
//! transaction, so a call either commits completely or has no effect.
//!
//! ## Idempotency
//!
//! The `idempotency` tree maps each idempotency key to the document id it
//! was first stored under. Insert checks and writes that index inside the
//! same serializable transaction as the record itself; re-inserting a known
//! key returns the stored record unchanged.
//!
//! ## Authorizations
//!
//! Authorizations are append-only and keyed by `(document, public key)`, so
//! one authorizer can count at most once per document.
//!
//! ## Submission claims
//!
//! Handing a document to its custodian is guarded by a claim in the
//! `submissions` tree. [`TransactionLedger::claim_submission`] takes it only
//! for an authorized document with no live claim; the claim is dropped in the
//! same transaction that records the custodian's answer. A claim left behind
//! by a crash keeps its document from being submitted again.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, Transactional,
    TransactionalTree,
};
use uuid::Uuid;

use super::db::{decode_json, encode_json, DbError, SettlementDb};
use super::retry::{RetryError, RetryPolicy, Transient};
use crate::transaction::{Authorization, Transaction, TransactionStatus, ValidationError};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document {0} is already being submitted")]
    SubmissionInFlight(String),

    #[error("ledger commit failed after {attempts} attempts: {reason}")]
    Conflict { attempts: u32, reason: String },

    #[error("ledger storage error: {0}")]
    Storage(#[from] DbError),
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(DbError::Sled(e))
    }
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_transient())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

fn abort<T>(e: impl Into<LedgerError>) -> ConflictableTransactionResult<T, LedgerError> {
    Err(ConflictableTransactionError::Abort(e.into()))
}

fn from_tx_error(e: TransactionError<LedgerError>) -> LedgerError {
    match e {
        TransactionError::Abort(inner) => inner,
        TransactionError::Storage(sled_err) => sled_err.into(),
    }
}

/// Applies a status change and/or failure reason to one record inside a
/// running transaction.
fn apply_update(
    records: &TransactionalTree,
    document_id: &str,
    status: Option<TransactionStatus>,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> ConflictableTransactionResult<Transaction, LedgerError> {
    let Some(raw) = records.get(document_id.as_bytes())? else {
        return abort(LedgerError::NotFound(document_id.to_string()));
    };
    let mut record: Transaction = match decode_json(&raw) {
        Ok(record) => record,
        Err(e) => return abort(e),
    };
    if let Some(next) = status.filter(|s| *s != record.status) {
        record.status = match record.status.transition(next) {
            Ok(next) => next,
            Err(e) => return abort(e),
        };
    }
    if let Some(reason) = reason {
        record.failure_reason = Some(reason.to_string());
    }
    record.updated_at = now;
    let bytes = match encode_json(&record) {
        Ok(bytes) => bytes,
        Err(e) => return abort(e),
    };
    records.insert(document_id.as_bytes(), bytes)?;
    Ok(record)
}

fn authorization_key(document_id: &str, public_key_hex: &str) -> Vec<u8> {
    let mut key = authorization_prefix(document_id);
    key.extend_from_slice(public_key_hex.as_bytes());
    key
}

fn authorization_prefix(document_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(document_id.len() + 1);
    prefix.extend_from_slice(document_id.as_bytes());
    prefix.push(0);
    prefix
}

// ---------------------------------------------------------------------------
// TransactionLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransactionLedger {
    db: SettlementDb,
    retry: RetryPolicy,
}

impl TransactionLedger {
    pub fn new(db: SettlementDb) -> Self {
        Self {
            db,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn db(&self) -> &SettlementDb {
        &self.db
    }

    async fn retrying<T>(
        &self,
        operation: &str,
        op: impl Fn() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        self.retry
            .run(operation, || std::future::ready(op()))
            .await
            .map_err(|e| match e {
                RetryError::Permanent(inner) => inner,
                RetryError::Exhausted { attempts, last } => LedgerError::Conflict {
                    attempts,
                    reason: last.to_string(),
                },
            })
    }

    // -- Insert -------------------------------------------------------------

    /// Inserts each transaction unless its idempotency key is already known.
    ///
    /// Returns one record per input, in order: the new record with its
    /// assigned document id, or the stored original for known keys. Document
    /// ids are always assigned here; any id on the input is discarded.
    pub async fn insert_transactions(&self, txs: Vec<Transaction>) -> LedgerResult<Vec<Transaction>> {
        let now = Utc::now();
        let prepared: Vec<Transaction> = txs
            .into_iter()
            .map(|mut tx| {
                tx.document_id = Uuid::new_v4().to_string();
                tx.status = TransactionStatus::Prepared;
                tx.failure_reason = None;
                tx.created_at = now;
                tx.updated_at = now;
                tx
            })
            .collect();

        let stored = self
            .retrying("insert_transactions", || self.insert_once(&prepared))
            .await?;
        let created = stored
            .iter()
            .zip(&prepared)
            .filter(|(s, p)| s.document_id == p.document_id)
            .count();
        tracing::info!(
            requested = prepared.len(),
            created,
            "ledger insert committed"
        );
        Ok(stored)
    }

    fn insert_once(&self, prepared: &[Transaction]) -> LedgerResult<Vec<Transaction>> {
        (&self.db.transactions, &self.db.idempotency)
            .transaction(|(records, index)| {
                let mut out = Vec::with_capacity(prepared.len());
                for tx in prepared {
                    let key = tx.idempotency_key.as_bytes();
                    if let Some(doc) = index.get(key)? {
                        let raw = match records.get(&doc)? {
                            Some(raw) => raw,
                            None => {
                                let doc = String::from_utf8_lossy(&doc).into_owned();
                                return abort(DbError::Corrupt(doc));
                            }
                        };
                        match decode_json::<Transaction>(&raw) {
                            Ok(existing) => out.push(existing),
                            Err(e) => return abort(e),
                        }
                        continue;
                    }
                    let bytes = match encode_json(tx) {
                        Ok(bytes) => bytes,
                        Err(e) => return abort(e),
                    };
                    if records.get(tx.document_id.as_bytes())?.is_some() {
                        return abort(DbError::Corrupt(tx.document_id.clone()));
                    }
                    records.insert(tx.document_id.as_bytes(), bytes)?;
                    index.insert(&key[..], tx.document_id.as_bytes())?;
                    out.push(tx.clone());
                }
                Ok(out)
            })
            .map_err(from_tx_error)
    }

    // -- State transitions --------------------------------------------------

    /// Moves every existing transaction to `status`.
    ///
    /// Records are resolved by idempotency key; unknown ones are skipped.
    /// Records already in `status` are returned unchanged. Any illegal
    /// transition rejects the whole call.
    pub async fn update_transactions_state(
        &self,
        status: TransactionStatus,
        txs: &[Transaction],
    ) -> LedgerResult<Vec<Transaction>> {
        let now = Utc::now();
        let updated = self
            .retrying("update_transactions_state", || {
                (&self.db.transactions, &self.db.idempotency)
                    .transaction(|(records, index)| {
                        let mut out = Vec::with_capacity(txs.len());
                        for tx in txs {
                            let Some(doc) = index.get(tx.idempotency_key.as_bytes())? else {
                                continue;
                            };
                            let Some(raw) = records.get(&doc)? else {
                                continue;
                            };
                            let mut record: Transaction = match decode_json(&raw) {
                                Ok(record) => record,
                                Err(e) => return abort(e),
                            };
                            if record.status != status {
                                record.status = match record.status.transition(status) {
                                    Ok(next) => next,
                                    Err(e) => return abort(e),
                                };
                                record.updated_at = now;
                                let bytes = match encode_json(&record) {
                                    Ok(bytes) => bytes,
                                    Err(e) => return abort(e),
                                };
                                records.insert(&doc, bytes)?;
                            }
                            out.push(record);
                        }
                        Ok(out)
                    })
                    .map_err(from_tx_error)
            })
            .await?;
        tracing::info!(status = %status, updated = updated.len(), "ledger state update committed");
        Ok(updated)
    }

    /// Applies a status change and/or failure reason to one document.
    ///
    /// `status: None` keeps the current status and only records `reason`.
    pub async fn update_document(
        &self,
        document_id: &str,
        status: Option<TransactionStatus>,
        reason: Option<String>,
    ) -> LedgerResult<Transaction> {
        let now = Utc::now();
        self.retrying("update_document", || {
            self.db
                .transactions
                .transaction(|records| apply_update(records, document_id, status, reason.as_deref(), now))
                .map_err(from_tx_error)
        })
        .await
    }

    // -- Submission claims --------------------------------------------------

    /// Claims an authorized document for submission.
    ///
    /// Returns the record when this caller now holds the claim, `None` when
    /// the document is no longer authorized, and
    /// [`LedgerError::SubmissionInFlight`] when another caller holds it.
    pub async fn claim_submission(&self, document_id: &str) -> LedgerResult<Option<Transaction>> {
        let claimed_at = Utc::now().to_rfc3339();
        let claimed = self
            .retrying("claim_submission", || {
                (&self.db.transactions, &self.db.submissions)
                    .transaction(|(records, claims)| {
                        let Some(raw) = records.get(document_id.as_bytes())? else {
                            return abort(LedgerError::NotFound(document_id.to_string()));
                        };
                        let record: Transaction = match decode_json(&raw) {
                            Ok(record) => record,
                            Err(e) => return abort(e),
                        };
                        if claims.get(document_id.as_bytes())?.is_some() {
                            return abort(LedgerError::SubmissionInFlight(document_id.to_string()));
                        }
                        if record.status != TransactionStatus::Authorized {
                            return Ok(None);
                        }
                        claims.insert(document_id.as_bytes(), claimed_at.as_bytes())?;
                        Ok(Some(record))
                    })
                    .map_err(from_tx_error)
            })
            .await?;
        if claimed.is_some() {
            tracing::debug!(document_id, "submission claimed");
        }
        Ok(claimed)
    }

    /// Records the outcome of a claimed submission and drops the claim.
    pub async fn finish_submission(
        &self,
        document_id: &str,
        status: Option<TransactionStatus>,
        reason: Option<String>,
    ) -> LedgerResult<Transaction> {
        let now = Utc::now();
        self.retrying("finish_submission", || {
            (&self.db.transactions, &self.db.submissions)
                .transaction(|(records, claims)| {
                    let record = apply_update(records, document_id, status, reason.as_deref(), now)?;
                    claims.remove(document_id.as_bytes())?;
                    Ok(record)
                })
                .map_err(from_tx_error)
        })
        .await
    }

    pub fn is_submission_claimed(&self, document_id: &str) -> LedgerResult<bool> {
        Ok(self.db.submissions.contains_key(document_id.as_bytes())?)
    }

    // -- Authorizations -----------------------------------------------------

    /// Appends one authorization per `(document_id, signature)` pair for the
    /// key `public_key_hex`.
    ///
    /// Every referenced document must exist. A key that already authorized a
    /// document keeps its original record.
    pub async fn authorize_transactions(
        &self,
        public_key_hex: &str,
        grants: &[(String, String)],
    ) -> LedgerResult<Vec<Authorization>> {
        let candidates: Vec<Authorization> = grants
            .iter()
            .map(|(doc, sig)| Authorization::new(doc, public_key_hex, sig))
            .collect();

        let stored = self
            .retrying("authorize_transactions", || {
                (&self.db.transactions, &self.db.authorizations)
                    .transaction(|(records, auths)| {
                        let mut out = Vec::with_capacity(candidates.len());
                        for auth in &candidates {
                            if records.get(auth.document_id.as_bytes())?.is_none() {
                                return abort(LedgerError::NotFound(auth.document_id.clone()));
                            }
                            let key = authorization_key(&auth.document_id, &auth.public_key);
                            if let Some(raw) = auths.get(key.as_slice())? {
                                match decode_json::<Authorization>(&raw) {
                                    Ok(existing) => out.push(existing),
                                    Err(e) => return abort(e),
                                }
                                continue;
                            }
                            let bytes = match encode_json(auth) {
                                Ok(bytes) => bytes,
                                Err(e) => return abort(e),
                            };
                            auths.insert(key, bytes)?;
                            out.push(auth.clone());
                        }
                        Ok(out)
                    })
                    .map_err(from_tx_error)
            })
            .await?;
        tracing::info!(documents = stored.len(), "ledger authorizations committed");
        Ok(stored)
    }

    /// All authorizations recorded for a document, ordered by public key.
    pub fn authorizations_for(&self, document_id: &str) -> LedgerResult<Vec<Authorization>> {
        self.db
            .authorizations
            .scan_prefix(authorization_prefix(document_id))
            .values()
            .map(|raw| -> LedgerResult<Authorization> { Ok(decode_json(&raw?)?) })
            .collect()
    }

    /// Distinct public keys that authorized a document.
    pub fn distinct_authorizers(&self, document_id: &str) -> LedgerResult<BTreeSet<String>> {
        Ok(self
            .authorizations_for(document_id)?
            .into_iter()
            .map(|a| a.public_key)
            .collect())
    }

    // -- Lookups ------------------------------------------------------------

    pub fn get_transaction_from_doc_id(&self, document_id: &str) -> LedgerResult<Option<Transaction>> {
        match self.db.transactions.get(document_id.as_bytes())? {
            Some(raw) => Ok(Some(decode_json(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_transaction_by_idempotency_key(&self, key: &Uuid) -> LedgerResult<Option<Transaction>> {
        match self.db.idempotency.get(key.as_bytes())? {
            Some(doc) => match self.db.transactions.get(&doc)? {
                Some(raw) => Ok(Some(decode_json(&raw)?)),
                None => Err(DbError::Corrupt(String::from_utf8_lossy(&doc).into_owned()).into()),
            },
            None => Ok(None),
        }
    }
}
