//! Custodian submission seam used by the payments service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{Custodian, Transaction};

/// A custodian call that did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{custodian} rejected submission: {message}")]
pub struct CustodianApiError {
    pub custodian: Custodian,
    /// Whether the same request may succeed later unchanged.
    pub retriable: bool,
    pub message: String,
}

impl CustodianApiError {
    pub fn transient(custodian: Custodian, message: impl Into<String>) -> Self {
        Self {
            custodian,
            retriable: true,
            message: message.into(),
        }
    }

    pub fn rejected(custodian: Custodian, message: impl Into<String>) -> Self {
        Self {
            custodian,
            retriable: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub custodian: Custodian,
    /// Custodian-side transfer reference.
    pub reference: String,
}

#[async_trait]
pub trait CustodianClient: Send + Sync {
    async fn submit(&self, tx: &Transaction) -> Result<SubmissionReceipt, CustodianApiError>;
}

/// Accepts every submission without contacting a custodian.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunCustodianClient;

#[async_trait]
impl CustodianClient for DryRunCustodianClient {
    async fn submit(&self, tx: &Transaction) -> Result<SubmissionReceipt, CustodianApiError> {
        tracing::info!(
            document_id = %tx.document_id,
            custodian = %tx.custodian,
            amount = %tx.amount,
            "dry-run submission accepted"
        );
        Ok(SubmissionReceipt {
            custodian: tx.custodian,
            reference: format!("dry-run-{}", tx.document_id),
        })
    }
}
