//! Crate-level error categories.
//!
//! Component errors stay precise inside their modules. At the service edge
//! they collapse into [`SettlementError`], which answers the two questions
//! a caller has: may I retry, and which HTTP status applies.

use thiserror::Error;

use crate::authorization::{AuthorizationError, HttpSignatureError};
use crate::crypto::exchange::ExchangeError;
use crate::custodian::{ArtifactError, CustodianApiError, RateError};
use crate::partition::PartitionError;
use crate::storage::LedgerError;
use crate::transaction::ValidationError;
use crate::vault::VaultError;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("duplicate reference: {0}")]
    DuplicateKey(String),

    #[error("secret backend: {message}")]
    SecretBackend { message: String, transient: bool },

    #[error("ledger conflict: {0}")]
    LedgerConflict(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error(transparent)]
    CustodianApi(#[from] CustodianApiError),

    #[error("conversion rate unavailable: {0}")]
    RateUnavailable(#[from] RateError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    pub fn is_retriable(&self) -> bool {
        match self {
            SettlementError::SecretBackend { transient, .. } => *transient,
            SettlementError::LedgerConflict(_) => true,
            SettlementError::CustodianApi(e) => e.retriable,
            _ => false,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            SettlementError::Validation(_) => 400,
            SettlementError::DuplicateKey(_) => 409,
            SettlementError::Authorization(_) => 403,
            SettlementError::NotFound(_) => 404,
            SettlementError::SecretBackend { .. } | SettlementError::LedgerConflict(_) => 503,
            SettlementError::RateUnavailable(_) => 503,
            SettlementError::CustodianApi(e) if e.retriable => 503,
            SettlementError::CustodianApi(_) => 502,
            SettlementError::Io(_) | SettlementError::Internal(_) => 500,
        }
    }
}

impl From<ValidationError> for SettlementError {
    fn from(e: ValidationError) -> Self {
        SettlementError::Validation(e.to_string())
    }
}

impl From<AuthorizationError> for SettlementError {
    fn from(e: AuthorizationError) -> Self {
        SettlementError::Authorization(e.to_string())
    }
}

impl From<HttpSignatureError> for SettlementError {
    fn from(e: HttpSignatureError) -> Self {
        SettlementError::Authorization(e.to_string())
    }
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Validation(v) => v.into(),
            LedgerError::NotFound(doc) => SettlementError::NotFound(format!("document {doc}")),
            LedgerError::Conflict { .. } | LedgerError::SubmissionInFlight(_) => {
                SettlementError::LedgerConflict(e.to_string())
            }
            LedgerError::Storage(db) => SettlementError::Io(db.to_string()),
        }
    }
}

impl From<VaultError> for SettlementError {
    fn from(e: VaultError) -> Self {
        SettlementError::SecretBackend {
            transient: e.is_transient(),
            message: e.to_string(),
        }
    }
}

impl From<ExchangeError> for SettlementError {
    fn from(e: ExchangeError) -> Self {
        SettlementError::Validation(format!("sealed secret: {e}"))
    }
}

impl From<ArtifactError> for SettlementError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::Vault(v) => v.into(),
            ArtifactError::MissingCredential { .. } => SettlementError::SecretBackend {
                message: e.to_string(),
                transient: false,
            },
            ArtifactError::Rate(r) => SettlementError::RateUnavailable(r),
            ArtifactError::DuplicateReference { .. } => SettlementError::DuplicateKey(e.to_string()),
            ArtifactError::TooManyRows { .. } | ArtifactError::UnsupportedCurrency(_) => {
                SettlementError::Validation(e.to_string())
            }
            ArtifactError::Mac(_) | ArtifactError::Signing(_) | ArtifactError::Serialization(_) => {
                SettlementError::Internal(e.to_string())
            }
        }
    }
}

impl From<PartitionError> for SettlementError {
    fn from(e: PartitionError) -> Self {
        match e {
            PartitionError::Artifact { source, .. } => source.into(),
            PartitionError::DuplicateReference { .. } => SettlementError::DuplicateKey(e.to_string()),
            PartitionError::NoInput | PartitionError::Decode { .. } | PartitionError::Validation { .. } => {
                SettlementError::Validation(e.to_string())
            }
            PartitionError::Read { .. } | PartitionError::Write { .. } => SettlementError::Io(e.to_string()),
        }
    }
}
