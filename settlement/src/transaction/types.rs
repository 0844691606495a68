//! # Transaction Types
//!
//! Core enums shared by the ledger and the offline signing pipeline:
//! custodians, wallet types, lifecycle status, and the `custodian-type`
//! wallet key that addresses vault secrets and output buckets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Malformed or out-of-range input. Never retriable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown custodian: {0}")]
    UnknownCustodian(String),

    #[error("unknown wallet type {wallet_type} for custodian {custodian}")]
    UnknownWalletType {
        custodian: String,
        wallet_type: String,
    },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("amount must be greater than zero, got {0}")]
    NonPositiveAmount(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

// ---------------------------------------------------------------------------
// Custodian
// ---------------------------------------------------------------------------

/// External payment provider that moves funds to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Custodian {
    Uphold,
    Gemini,
    Paypal,
    Bitflyer,
}

impl Custodian {
    /// Every custodian, in the order buckets are processed.
    pub const ALL: [Custodian; 4] = [
        Custodian::Uphold,
        Custodian::Paypal,
        Custodian::Gemini,
        Custodian::Bitflyer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Custodian::Uphold => "uphold",
            Custodian::Gemini => "gemini",
            Custodian::Paypal => "paypal",
            Custodian::Bitflyer => "bitflyer",
        }
    }

    /// Wallet types this custodian keeps separate secrets for.
    pub fn wallet_types(&self) -> &'static [WalletType] {
        match self {
            Custodian::Uphold | Custodian::Gemini => &[
                WalletType::Contribution,
                WalletType::Referral,
                WalletType::AdsDirectDeposit,
            ],
            Custodian::Paypal | Custodian::Bitflyer => &[WalletType::Default],
        }
    }

    /// Resolves the wallet type a record lands in.
    ///
    /// Custodians with a single wallet type collapse every record into it.
    pub fn bucket_for(&self, wallet_type: &str) -> Result<WalletType, ValidationError> {
        let types = self.wallet_types();
        if let [only] = types {
            return Ok(*only);
        }
        let parsed: WalletType = wallet_type.parse().map_err(|_| self.unknown_type(wallet_type))?;
        if types.contains(&parsed) {
            Ok(parsed)
        } else {
            Err(self.unknown_type(wallet_type))
        }
    }

    fn unknown_type(&self, wallet_type: &str) -> ValidationError {
        ValidationError::UnknownWalletType {
            custodian: self.as_str().to_string(),
            wallet_type: wallet_type.to_string(),
        }
    }
}

impl fmt::Display for Custodian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Custodian {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uphold" => Ok(Custodian::Uphold),
            "gemini" => Ok(Custodian::Gemini),
            "paypal" => Ok(Custodian::Paypal),
            "bitflyer" => Ok(Custodian::Bitflyer),
            _ => Err(ValidationError::UnknownCustodian(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet type
// ---------------------------------------------------------------------------

/// Category of payout, each backed by its own custodian wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WalletType {
    Contribution,
    Referral,
    Default,
    AdsDirectDeposit,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Contribution => "contribution",
            WalletType::Referral => "referral",
            WalletType::Default => "default",
            WalletType::AdsDirectDeposit => "adsDirectDeposit",
        }
    }
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "contribution" => Ok(WalletType::Contribution),
            "referral" => Ok(WalletType::Referral),
            "default" => Ok(WalletType::Default),
            "adsDirectDeposit" | "ads_direct_deposit" => Ok(WalletType::AdsDirectDeposit),
            other => Err(ValidationError::MalformedField {
                field: "type",
                reason: format!("unknown wallet type {other}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet key
// ---------------------------------------------------------------------------

/// `custodian-type` pair naming a vault secret bundle and an output bucket,
/// e.g. `gemini-contribution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletKey {
    pub custodian: Custodian,
    pub wallet_type: WalletType,
}

impl WalletKey {
    pub fn new(custodian: Custodian, wallet_type: WalletType) -> Self {
        Self {
            custodian,
            wallet_type,
        }
    }

    /// All wallet keys for the given custodians, in processing order.
    pub fn all_for(custodians: &[Custodian]) -> Vec<WalletKey> {
        custodians
            .iter()
            .flat_map(|c| c.wallet_types().iter().map(move |t| WalletKey::new(*c, *t)))
            .collect()
    }
}

impl fmt::Display for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.custodian, self.wallet_type)
    }
}

impl FromStr for WalletKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (custodian, wallet_type) = s.split_once('-').ok_or(ValidationError::MalformedField {
            field: "wallet_key",
            reason: format!("expected custodian-type, got {s}"),
        })?;
        let custodian: Custodian = custodian.parse()?;
        let wallet_type: WalletType = wallet_type.parse()?;
        if !custodian.wallet_types().contains(&wallet_type) {
            return Err(custodian.unknown_type(wallet_type.as_str()));
        }
        Ok(WalletKey::new(custodian, wallet_type))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of a ledger transaction.
///
/// ```text
/// prepared -> authorized -> submitted -> complete
///     \            \            \
///      +-----------+------------+-> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Prepared,
    Authorized,
    Submitted,
    Complete,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Prepared => "prepared",
            TransactionStatus::Authorized => "authorized",
            TransactionStatus::Submitted => "submitted",
            TransactionStatus::Complete => "complete",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Complete | TransactionStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Prepared, Authorized)
                | (Prepared, Failed)
                | (Authorized, Submitted)
                | (Authorized, Failed)
                | (Submitted, Complete)
                | (Submitted, Failed)
        )
    }

    /// Returns `next` if the transition is legal.
    pub fn transition(&self, next: TransactionStatus) -> Result<TransactionStatus, ValidationError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ValidationError::InvalidTransition { from: *self, to: next })
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prepared" => Ok(TransactionStatus::Prepared),
            "authorized" => Ok(TransactionStatus::Authorized),
            "submitted" => Ok(TransactionStatus::Submitted),
            "complete" => Ok(TransactionStatus::Complete),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(ValidationError::MalformedField {
                field: "status",
                reason: format!("unknown status {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custodian_parses_case_insensitively() {
        assert_eq!("Gemini".parse::<Custodian>().unwrap(), Custodian::Gemini);
        assert!("venmo".parse::<Custodian>().is_err());
    }

    #[test]
    fn single_type_custodians_collapse_to_default() {
        assert_eq!(Custodian::Paypal.bucket_for("contribution").unwrap(), WalletType::Default);
        assert_eq!(Custodian::Bitflyer.bucket_for("").unwrap(), WalletType::Default);
    }

    #[test]
    fn multi_type_custodians_reject_default() {
        assert!(Custodian::Uphold.bucket_for("default").is_err());
        assert_eq!(
            Custodian::Gemini.bucket_for("adsDirectDeposit").unwrap(),
            WalletType::AdsDirectDeposit
        );
    }

    #[test]
    fn wallet_key_display_and_parse() {
        let key = WalletKey::new(Custodian::Gemini, WalletType::Contribution);
        assert_eq!(key.to_string(), "gemini-contribution");
        assert_eq!("gemini-contribution".parse::<WalletKey>().unwrap(), key);
        assert_eq!(
            "uphold-adsDirectDeposit".parse::<WalletKey>().unwrap().wallet_type,
            WalletType::AdsDirectDeposit
        );
        assert!("paypal-referral".parse::<WalletKey>().is_err());
        assert!("gemini".parse::<WalletKey>().is_err());
    }

    #[test]
    fn wallet_keys_for_all_custodians() {
        let keys = WalletKey::all_for(&Custodian::ALL);
        assert_eq!(keys.len(), 8);
        assert_eq!(keys[0].to_string(), "uphold-contribution");
    }

    #[test]
    fn status_transitions() {
        use TransactionStatus::*;
        assert!(Prepared.can_transition_to(Authorized));
        assert!(Authorized.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Complete));
        assert!(!Prepared.can_transition_to(Submitted));
        assert!(!Failed.can_transition_to(Prepared));
        assert!(!Complete.can_transition_to(Failed));
        assert!(Failed.is_terminal());
        assert!(matches!(
            Complete.transition(Prepared),
            Err(ValidationError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TransactionStatus::Submitted).unwrap();
        assert_eq!(json, "\"submitted\"");
    }
}
