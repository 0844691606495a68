//! Ledger-side transaction and authorization records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{Custodian, TransactionStatus, ValidationError, WalletType};

/// Payment details a caller submits to `prepare`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    /// Caller-chosen idempotency key. Derived from the other fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
    pub amount: Decimal,
    /// Destination identifier at the custodian.
    pub to: String,
    /// Origin (source wallet or owner) identifier.
    pub from: String,
    pub custodian: Custodian,
    #[serde(default = "default_wallet_type")]
    pub wallet_type: WalletType,
    /// Settlement (payout report) this payment belongs to.
    pub settlement_id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_wallet_type() -> WalletType {
    WalletType::Default
}

fn default_currency() -> String {
    crate::config::DEFAULT_PAYOUT_CURRENCY.to_string()
}

impl PaymentDetails {
    /// Checks the fields that must hold before anything touches the ledger.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.to.trim().is_empty() {
            return Err(ValidationError::MissingField("to"));
        }
        if self.from.trim().is_empty() {
            return Err(ValidationError::MissingField("from"));
        }
        if self.settlement_id.trim().is_empty() {
            return Err(ValidationError::MissingField("settlementId"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(self.amount.to_string()));
        }
        Ok(())
    }

    /// Deterministic idempotency key over the payment's identifying fields.
    pub fn derive_idempotency_key(&self, namespace: &Uuid) -> Uuid {
        let name = format!(
            "{}|{}|{}|{}|{}|{}",
            self.to,
            self.from,
            self.currency,
            self.amount.normalize(),
            self.custodian,
            self.settlement_id
        );
        Uuid::new_v5(namespace, name.as_bytes())
    }

    /// Builds the prepared ledger record. `document_id` is assigned by the ledger.
    pub fn into_transaction(self, namespace: &Uuid) -> Transaction {
        let idempotency_key = self
            .idempotency_key
            .unwrap_or_else(|| self.derive_idempotency_key(namespace));
        let now = Utc::now();
        Transaction {
            idempotency_key,
            document_id: String::new(),
            amount: self.amount,
            to: self.to,
            from: self.from,
            custodian: self.custodian,
            wallet_type: self.wallet_type,
            settlement_id: self.settlement_id,
            currency: self.currency,
            status: TransactionStatus::Prepared,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A transaction as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub idempotency_key: Uuid,
    /// Opaque ledger handle. Empty until inserted.
    pub document_id: String,
    pub amount: Decimal,
    pub to: String,
    pub from: String,
    pub custodian: Custodian,
    pub wallet_type: WalletType,
    pub settlement_id: String,
    pub currency: String,
    pub status: TransactionStatus,
    /// Last custodian or validation failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One authorizer's sign-off on a ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub id: Uuid,
    pub document_id: String,
    /// Hex-encoded Ed25519 public key of the authorizer.
    pub public_key: String,
    /// Base64 signature over the raw document id bytes.
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

impl Authorization {
    pub fn new(document_id: &str, public_key: &str, signature: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            public_key: public_key.to_ascii_lowercase(),
            signature: signature.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IDEMPOTENCY_NAMESPACE;

    fn details() -> PaymentDetails {
        PaymentDetails {
            idempotency_key: None,
            amount: Decimal::new(1250, 2),
            to: "dest-1".into(),
            from: "origin-1".into(),
            custodian: Custodian::Uphold,
            wallet_type: WalletType::Contribution,
            settlement_id: "settlement-1".into(),
            currency: "BAT".into(),
        }
    }

    #[test]
    fn derived_key_is_stable() {
        let a = details().derive_idempotency_key(&IDEMPOTENCY_NAMESPACE);
        let b = details().derive_idempotency_key(&IDEMPOTENCY_NAMESPACE);
        assert_eq!(a, b);
    }

    #[test]
    fn derived_key_ignores_trailing_zeros() {
        let mut other = details();
        other.amount = Decimal::new(125000, 4);
        assert_eq!(
            details().derive_idempotency_key(&IDEMPOTENCY_NAMESPACE),
            other.derive_idempotency_key(&IDEMPOTENCY_NAMESPACE)
        );
    }

    #[test]
    fn derived_key_changes_with_destination() {
        let mut other = details();
        other.to = "dest-2".into();
        assert_ne!(
            details().derive_idempotency_key(&IDEMPOTENCY_NAMESPACE),
            other.derive_idempotency_key(&IDEMPOTENCY_NAMESPACE)
        );
    }

    #[test]
    fn explicit_key_wins() {
        let key = Uuid::new_v4();
        let mut d = details();
        d.idempotency_key = Some(key);
        assert_eq!(d.into_transaction(&IDEMPOTENCY_NAMESPACE).idempotency_key, key);
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut d = details();
        d.amount = Decimal::ZERO;
        assert!(matches!(d.validate(), Err(ValidationError::NonPositiveAmount(_))));

        let mut d = details();
        d.to = "  ".into();
        assert_eq!(d.validate(), Err(ValidationError::MissingField("to")));
    }

    #[test]
    fn payment_details_json_shape() {
        let json = r#"{
            "amount": "3.5",
            "to": "dest",
            "from": "origin",
            "custodian": "gemini",
            "walletType": "referral",
            "settlementId": "s-1"
        }"#;
        let d: PaymentDetails = serde_json::from_str(json).unwrap();
        assert_eq!(d.amount, Decimal::new(35, 1));
        assert_eq!(d.currency, "BAT");
        assert_eq!(d.wallet_type, WalletType::Referral);
    }
}
