//! # Payout Records
//!
//! Settlement input files are arrays of antifraud-approved records. Two
//! shapes exist in the wild:
//!
//! - the legacy form, carrying `amount`, `walletProvider` and
//!   `walletProviderId` directly;
//! - the v2 form, carrying `bat`, `payout_report_id` and a packed
//!   `wallet_provider_id` of `establishment#type:id`.
//!
//! Both normalize into a [`Payout`], the record every custodian artifact is
//! built from.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{Custodian, ValidationError, WalletKey, WalletType};
use crate::config::DEFAULT_PAYOUT_CURRENCY;
use crate::crypto::hash::reference_id;

/// A raw record from an antifraud-approved settlement file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntifraudRecord {
    #[serde(default, alias = "destination")]
    pub address: String,
    #[serde(default, alias = "origin")]
    pub owner: String,
    #[serde(default, alias = "channel")]
    pub publisher: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub bat: Option<Decimal>,
    #[serde(default, rename = "walletProvider", alias = "custodian")]
    pub wallet_provider: Option<String>,
    #[serde(default, rename = "walletProviderId")]
    pub wallet_provider_id: Option<String>,
    /// Packed `establishment#type:id` provider info of the v2 form.
    #[serde(default, rename = "wallet_provider_id")]
    pub wallet_provider_info: Option<String>,
    #[serde(default, rename = "transactionId", alias = "settlementId")]
    pub settlement_id: Option<String>,
    #[serde(default)]
    pub payout_report_id: Option<String>,
    #[serde(default, rename = "type")]
    pub wallet_type: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Pieces of a packed `establishment#type:id` provider string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub establishment: String,
    pub kind: String,
    pub id: String,
}

impl ProviderInfo {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedField {
            field: "wallet_provider_id",
            reason: format!("expected establishment#type:id, got {raw}"),
        };
        let (establishment, rest) = raw.split_once('#').ok_or_else(malformed)?;
        let (kind, id) = rest.split_once(':').ok_or_else(malformed)?;
        if establishment.is_empty() || id.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            establishment: establishment.to_string(),
            kind: kind.to_string(),
            id: id.to_string(),
        })
    }
}

impl AntifraudRecord {
    /// Validates and normalizes the record.
    ///
    /// A non-positive amount is reported as
    /// [`ValidationError::NonPositiveAmount`] before any other check so the
    /// caller can skip such records without rejecting the file.
    pub fn into_payout(self) -> Result<Payout, ValidationError> {
        let v2_amount = self.bat.filter(|bat| *bat > Decimal::ZERO);

        let (amount, custodian_raw, provider_id, settlement_id) = match v2_amount {
            Some(bat) => {
                let packed = self
                    .wallet_provider_info
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or(ValidationError::MissingField("wallet_provider_id"))?;
                let info = ProviderInfo::parse(packed)?;
                let settlement = self.payout_report_id.clone().or(self.settlement_id.clone());
                (bat, Some(info.establishment), Some(info.id), settlement)
            }
            None => (
                self.amount.unwrap_or(Decimal::ZERO),
                self.wallet_provider.clone(),
                self.wallet_provider_id.clone(),
                self.settlement_id.clone().or(self.payout_report_id.clone()),
            ),
        };

        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount.to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(ValidationError::MissingField("address"));
        }

        let custodian: Custodian = custodian_raw
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("walletProvider"))?
            .parse()?;
        let wallet_provider_id = provider_id
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("walletProviderId"))?;
        let settlement_id = settlement_id
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("transactionId"))?;
        let wallet_type = custodian.bucket_for(&self.wallet_type)?;

        Ok(Payout {
            altcurrency: DEFAULT_PAYOUT_CURRENCY.to_string(),
            amount,
            currency: self
                .currency
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_PAYOUT_CURRENCY.to_string()),
            destination: self.address,
            origin: self.owner,
            channel: self.publisher,
            custodian,
            wallet_provider_id,
            settlement_id,
            wallet_type,
            note: self.note.filter(|n| !n.is_empty()),
            signed_tx: None,
        })
    }
}

/// A validated payout, ready for bucketing and artifact generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub altcurrency: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "address")]
    pub destination: String,
    #[serde(rename = "owner", default)]
    pub origin: String,
    #[serde(rename = "publisher", default)]
    pub channel: String,
    #[serde(rename = "walletProvider")]
    pub custodian: Custodian,
    #[serde(rename = "walletProviderId")]
    pub wallet_provider_id: String,
    #[serde(rename = "transactionId")]
    pub settlement_id: String,
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Encapsulated signed transfer, filled in by the Uphold generator.
    #[serde(rename = "signedTx", default, skip_serializing_if = "Option::is_none")]
    pub signed_tx: Option<String>,
}

impl Payout {
    pub fn wallet_key(&self) -> WalletKey {
        WalletKey::new(self.custodian, self.wallet_type)
    }

    /// Batch-unique reference over destination, channel and settlement id.
    pub fn reference_id(&self) -> String {
        let destination = normalize(&self.destination);
        let channel = normalize(&self.channel);
        let settlement = normalize(&self.settlement_id);
        reference_id(&[&destination, &channel, &settlement], "_")
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy() -> AntifraudRecord {
        serde_json::from_str(
            r#"{
                "address": "dest-1",
                "owner": "publishers#uuid:1",
                "publisher": "brave.com",
                "amount": "10.5",
                "walletProvider": "gemini",
                "walletProviderId": "provider-1",
                "transactionId": "settlement-1",
                "type": "contribution"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn legacy_record_normalizes() {
        let payout = legacy().into_payout().unwrap();
        assert_eq!(payout.custodian, Custodian::Gemini);
        assert_eq!(payout.wallet_type, WalletType::Contribution);
        assert_eq!(payout.amount, Decimal::new(105, 1));
        assert_eq!(payout.currency, "BAT");
        assert_eq!(payout.wallet_key().to_string(), "gemini-contribution");
    }

    #[test]
    fn v2_record_unpacks_provider_info() {
        let record: AntifraudRecord = serde_json::from_str(
            r#"{
                "address": "dest-2",
                "publisher": "youtube#channel:abc",
                "bat": "4",
                "payout_report_id": "report-7",
                "wallet_provider_id": "uphold#card:card-9",
                "type": "referral"
            }"#,
        )
        .unwrap();
        let payout = record.into_payout().unwrap();
        assert_eq!(payout.custodian, Custodian::Uphold);
        assert_eq!(payout.wallet_provider_id, "card-9");
        assert_eq!(payout.settlement_id, "report-7");
        assert_eq!(payout.amount, Decimal::new(4, 0));
    }

    #[test]
    fn zero_amount_reported_first() {
        let mut record = legacy();
        record.amount = Some(Decimal::ZERO);
        record.wallet_provider_id = None;
        assert!(matches!(
            record.into_payout(),
            Err(ValidationError::NonPositiveAmount(_))
        ));
    }

    #[test]
    fn missing_destination_rejected() {
        let mut record = legacy();
        record.address = String::new();
        assert_eq!(
            record.into_payout(),
            Err(ValidationError::MissingField("address"))
        );
    }

    #[test]
    fn unknown_custodian_rejected() {
        let mut record = legacy();
        record.wallet_provider = Some("venmo".into());
        assert!(matches!(
            record.into_payout(),
            Err(ValidationError::UnknownCustodian(_))
        ));
    }

    #[test]
    fn malformed_provider_info_rejected() {
        assert!(ProviderInfo::parse("uphold-card-1").is_err());
        assert!(ProviderInfo::parse("#card:1").is_err());
        assert_eq!(ProviderInfo::parse("bitflyer#id:xyz").unwrap().id, "xyz");
    }

    #[test]
    fn reference_id_normalizes_case_and_whitespace() {
        let a = legacy().into_payout().unwrap();
        let mut b = a.clone();
        b.channel = " BRAVE.com ".into();
        assert_eq!(a.reference_id(), b.reference_id());

        let mut c = a.clone();
        c.settlement_id = "settlement-2".into();
        assert_ne!(a.reference_id(), c.reference_id());
    }

    #[test]
    fn payout_serializes_with_legacy_field_names() {
        let payout = legacy().into_payout().unwrap();
        let json = serde_json::to_value(&payout).unwrap();
        assert_eq!(json["address"], "dest-1");
        assert_eq!(json["walletProvider"], "gemini");
        assert_eq!(json["transactionId"], "settlement-1");
        assert!(json.get("signedTx").is_none());
    }
}
