use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{PayoutStatus, PayoutStatusCache};
use crate::authorization::{AuthorizationError, AuthorizationVerifier};
use crate::config::ServiceConfig;
use crate::crypto::exchange::SecretExchange;
use crate::custodian::CustodianClient;
use crate::error::SettlementError;
use crate::storage::TransactionLedger;
use crate::transaction::{PaymentDetails, Transaction, TransactionStatus, ValidationError, WalletKey};
use crate::vault::{VaultSecretStore, WalletSecret};

/// Public service details for operators and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub environment: String,
    pub authorization_threshold: usize,
    /// X25519 key that wallet secrets must be sealed to.
    pub secret_exchange_public_key: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeOutcome {
    pub transaction: Transaction,
    pub distinct_authorizers: usize,
}

/// A wallet bundle sealed to the service's exchange key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedWalletSecret {
    pub wallet_key: String,
    /// Sender's ephemeral X25519 public key, hex.
    pub sender_public_key: String,
    /// `nonce || ciphertext`, base64.
    pub sealed: String,
}

/// Plaintext inside a [`SealedWalletSecret`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletPayload {
    #[serde(flatten)]
    wallet: WalletSecret,
    /// Base64 HMAC secret, for custodians that sign with one.
    #[serde(default)]
    shared_secret: Option<String>,
}

pub struct PaymentsService {
    config: ServiceConfig,
    ledger: TransactionLedger,
    verifier: AuthorizationVerifier,
    vault: VaultSecretStore,
    custodians: Arc<dyn CustodianClient>,
    exchange: SecretExchange,
    payout_status: PayoutStatusCache,
    started_at: DateTime<Utc>,
}

impl PaymentsService {
    pub fn new(
        config: ServiceConfig,
        ledger: TransactionLedger,
        verifier: AuthorizationVerifier,
        vault: VaultSecretStore,
        custodians: Arc<dyn CustodianClient>,
    ) -> Self {
        let exchange = SecretExchange::generate();
        tracing::info!(
            environment = %config.environment,
            threshold = verifier.threshold(),
            exchange_key = %exchange.public_key_hex(),
            "payments service initialized"
        );
        Self {
            config,
            ledger,
            verifier,
            vault,
            custodians,
            exchange,
            payout_status: PayoutStatusCache::default(),
            started_at: Utc::now(),
        }
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            environment: self.config.environment.clone(),
            authorization_threshold: self.verifier.threshold(),
            secret_exchange_public_key: self.exchange.public_key_hex(),
            started_at: self.started_at,
        }
    }

    /// Validates and records payments. Known idempotency keys return the
    /// stored record.
    pub async fn prepare(&self, payments: Vec<PaymentDetails>) -> Result<Vec<Transaction>, SettlementError> {
        if payments.is_empty() {
            return Err(ValidationError::MissingField("transactions").into());
        }
        for payment in &payments {
            payment.validate()?;
        }
        let namespace = self.config.idempotency_namespace;
        let txs = payments
            .into_iter()
            .map(|p| p.into_transaction(&namespace))
            .collect();
        Ok(self.ledger.insert_transactions(txs).await?)
    }

    /// Records one authorizer's signature over `document_id`. Reaching the
    /// threshold moves a prepared document to authorized.
    pub async fn authorize(
        &self,
        document_id: &str,
        public_key: &str,
        signature_b64: &str,
    ) -> Result<AuthorizeOutcome, SettlementError> {
        let key = self.verifier.verify_document_signature(
            document_id,
            public_key,
            signature_b64,
            &self.config.environment,
        )?;
        let key_hex = hex::encode(key);
        self.ledger
            .authorize_transactions(&key_hex, &[(document_id.to_string(), signature_b64.to_string())])
            .await?;

        let distinct = self.ledger.distinct_authorizers(document_id)?.len();
        let mut transaction = self.load(document_id)?;
        if transaction.status == TransactionStatus::Prepared && self.verifier.check_threshold(distinct).is_ok() {
            transaction = self
                .ledger
                .update_document(document_id, Some(TransactionStatus::Authorized), None)
                .await?;
        }
        tracing::info!(document_id, authorizer = %key_hex, distinct, status = %transaction.status, "document authorized");
        Ok(AuthorizeOutcome {
            transaction,
            distinct_authorizers: distinct,
        })
    }

    /// Hands an authorized document to its custodian.
    ///
    /// Only the caller holding the ledger's submission claim reaches the
    /// custodian; concurrent callers get a retriable conflict. Retriable
    /// custodian failures keep the document authorized with the reason
    /// recorded; other failures mark it failed. Submitting an already
    /// submitted document returns it unchanged.
    pub async fn submit(&self, document_id: &str) -> Result<Transaction, SettlementError> {
        if document_id.is_empty() {
            return Err(AuthorizationError::EmptyDocumentId.into());
        }
        let transaction = self.load(document_id)?;
        if let Some(settled) = settled(transaction.clone()) {
            return settled;
        }

        let distinct = self.ledger.distinct_authorizers(document_id)?.len();
        if let Err(e) = self.verifier.check_threshold(distinct) {
            tracing::warn!(document_id, distinct, "submission refused below threshold");
            return Err(e.into());
        }
        if transaction.status == TransactionStatus::Prepared {
            self.ledger
                .update_document(document_id, Some(TransactionStatus::Authorized), None)
                .await?;
        }

        let transaction = match self.ledger.claim_submission(document_id).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                // Finished by another caller since the first read.
                return settled(self.load(document_id)?).unwrap_or_else(|| {
                    Err(SettlementError::LedgerConflict(format!(
                        "document {document_id} changed during submission"
                    )))
                });
            }
            Err(e) => {
                tracing::warn!(document_id, error = %e, "submission already in flight");
                return Err(e.into());
            }
        };

        match self.custodians.submit(&transaction).await {
            Ok(receipt) => {
                let submitted = self
                    .ledger
                    .finish_submission(document_id, Some(TransactionStatus::Submitted), None)
                    .await?;
                tracing::info!(document_id, reference = %receipt.reference, "document submitted");
                Ok(submitted)
            }
            Err(e) if e.retriable => {
                tracing::warn!(document_id, error = %e, "custodian submission failed, retriable");
                self.ledger
                    .finish_submission(document_id, None, Some(e.message.clone()))
                    .await?;
                Err(e.into())
            }
            Err(e) => {
                tracing::error!(document_id, error = %e, "custodian rejected submission");
                self.ledger
                    .finish_submission(document_id, Some(TransactionStatus::Failed), Some(e.message.clone()))
                    .await?;
                Err(e.into())
            }
        }
    }

    pub fn transaction(&self, document_id: &str) -> Result<Transaction, SettlementError> {
        self.load(document_id)
    }

    pub fn payout_status(&self) -> PayoutStatus {
        self.payout_status.get()
    }

    pub fn set_payout_status(&self, status: PayoutStatus) {
        let previous = self.payout_status.replace(status);
        tracing::info!(?previous, "payout status replaced");
    }

    /// Opens a sealed wallet bundle and stores it in the vault.
    pub fn import_sealed_secret(&self, sealed: &SealedWalletSecret) -> Result<WalletKey, SettlementError> {
        let wallet_key: WalletKey = sealed.wallet_key.parse()?;
        let sender = hex::decode(sealed.sender_public_key.trim())
            .map_err(|_| SettlementError::Validation("senderPublicKey is not hex".into()))?;
        let ciphertext = STANDARD
            .decode(sealed.sealed.trim())
            .map_err(|_| SettlementError::Validation("sealed is not base64".into()))?;
        let plaintext = self.exchange.open(&sender, &ciphertext)?;
        let payload: WalletPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| SettlementError::Validation(format!("sealed wallet bundle: {e}")))?;

        let key = wallet_key.to_string();
        self.vault.put_wallet(&key, &payload.wallet)?;
        if let Some(secret) = payload.shared_secret {
            let secret = STANDARD
                .decode(secret.trim())
                .map_err(|_| SettlementError::Validation("sharedSecret is not base64".into()))?;
            self.vault.import_shared_secret(&key, &secret)?;
        }
        tracing::info!(wallet_key = %key, "sealed wallet secret imported");
        Ok(wallet_key)
    }

    fn load(&self, document_id: &str) -> Result<Transaction, SettlementError> {
        self.ledger
            .get_transaction_from_doc_id(document_id)?
            .ok_or_else(|| SettlementError::NotFound(format!("document {document_id}")))
    }
}

/// Outcome for a document that is past submission, `None` while it may
/// still be submitted.
fn settled(transaction: Transaction) -> Option<Result<Transaction, SettlementError>> {
    match transaction.status {
        TransactionStatus::Submitted | TransactionStatus::Complete => Some(Ok(transaction)),
        TransactionStatus::Failed => Some(Err(ValidationError::InvalidTransition {
            from: TransactionStatus::Failed,
            to: TransactionStatus::Submitted,
        }
        .into())),
        TransactionStatus::Prepared | TransactionStatus::Authorized => None,
    }
}
