//! # Custodian Artifact Generators
//!
//! Each custodian turns one `custodian-type` bucket of payouts into a
//! complete, signed artifact:
//!
//! | Custodian | Artifact                                                   |
//! |-----------|------------------------------------------------------------|
//! | Uphold    | wallet info plus individually signed transfers             |
//! | Gemini    | bulk-pay blocks of ≤ 500, each with 10 pre-signed nonces   |
//! | PayPal    | reconciliation JSON plus a mass-pay CSV                    |
//! | Bitflyer  | payouts serialized as-is for a later online signing step   |
//!
//! Generators never touch the filesystem. They return an [`Artifact`]
//! holding every file's bytes so the caller can write all of a run's
//! output only after every bucket has been generated.

pub mod bitflyer;
pub mod client;
pub mod gemini;
pub mod paypal;
pub mod rates;
pub mod uphold;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::authorization::HttpSignatureError;
use crate::crypto::mac::MacError;
use crate::transaction::{Custodian, Payout, WalletKey};
use crate::vault::{VaultError, VaultSecretStore};

pub use bitflyer::BitflyerGenerator;
pub use client::{CustodianApiError, CustodianClient, DryRunCustodianClient, SubmissionReceipt};
pub use gemini::GeminiGenerator;
pub use paypal::PaypalGenerator;
pub use rates::{FixedRateProvider, RateError, RateProvider, RateQuote};
pub use uphold::UpholdGenerator;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("secret backend: {0}")]
    Vault(#[from] VaultError),

    #[error("wallet {wallet_key} has no {field} configured")]
    MissingCredential { wallet_key: String, field: &'static str },

    #[error("conversion rate: {0}")]
    Rate(#[from] RateError),

    #[error("reference id {reference} already seen in batch (rows {first} and {second})")]
    DuplicateReference {
        reference: String,
        first: usize,
        second: usize,
    },

    #[error("mass-pay batch has {rows} rows, limit is {limit}")]
    TooManyRows { rows: usize, limit: usize },

    #[error("unsupported payout currency {0}")]
    UnsupportedCurrency(String),

    #[error("hmac signing failed: {0}")]
    Mac(#[from] MacError),

    #[error("transfer signing failed: {0}")]
    Signing(#[from] HttpSignatureError),

    #[error("artifact encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One output file of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// Everything a generator produced for one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub files: Vec<ArtifactFile>,
}

impl Artifact {
    pub fn single(path: &Path, contents: Vec<u8>) -> Self {
        Self {
            files: vec![ArtifactFile {
                path: path.to_path_buf(),
                contents,
            }],
        }
    }
}

/// Collaborators shared by every generator in a run.
pub struct ArtifactContext<'a> {
    pub vault: &'a VaultSecretStore,
    pub rates: &'a dyn RateProvider,
    /// Local currency for mass-pay conversion.
    pub payout_currency: String,
    /// Collapse Uphold transfers sharing a custodian wallet id.
    pub merge_custodial: bool,
}

#[async_trait]
pub trait GenerateArtifact {
    /// Produces the complete artifact for one bucket, or fails without
    /// producing any part of it.
    async fn generate(
        &self,
        ctx: &ArtifactContext<'_>,
        output_path: &Path,
        wallet_key: WalletKey,
        payouts: &[Payout],
    ) -> Result<Artifact, ArtifactError>;
}

/// Generator selected by custodian.
#[derive(Debug, Clone)]
pub enum ArtifactGenerator {
    Uphold(UpholdGenerator),
    Gemini(GeminiGenerator),
    Paypal(PaypalGenerator),
    Bitflyer(BitflyerGenerator),
}

impl ArtifactGenerator {
    pub fn for_custodian(custodian: Custodian) -> Self {
        match custodian {
            Custodian::Uphold => ArtifactGenerator::Uphold(UpholdGenerator),
            Custodian::Gemini => ArtifactGenerator::Gemini(GeminiGenerator::default()),
            Custodian::Paypal => ArtifactGenerator::Paypal(PaypalGenerator),
            Custodian::Bitflyer => ArtifactGenerator::Bitflyer(BitflyerGenerator),
        }
    }
}

#[async_trait]
impl GenerateArtifact for ArtifactGenerator {
    async fn generate(
        &self,
        ctx: &ArtifactContext<'_>,
        output_path: &Path,
        wallet_key: WalletKey,
        payouts: &[Payout],
    ) -> Result<Artifact, ArtifactError> {
        match self {
            ArtifactGenerator::Uphold(g) => g.generate(ctx, output_path, wallet_key, payouts).await,
            ArtifactGenerator::Gemini(g) => g.generate(ctx, output_path, wallet_key, payouts).await,
            ArtifactGenerator::Paypal(g) => g.generate(ctx, output_path, wallet_key, payouts).await,
            ArtifactGenerator::Bitflyer(g) => g.generate(ctx, output_path, wallet_key, payouts).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use rust_decimal::Decimal;

    use crate::crypto::encryption::generate_key;
    use crate::transaction::{Custodian, Payout, WalletType};
    use crate::vault::VaultSecretStore;

    pub fn mounted_vault() -> VaultSecretStore {
        let vault = VaultSecretStore::open_temporary(generate_key()).unwrap();
        vault.generate_mounts().unwrap();
        vault
    }

    pub fn payout(custodian: Custodian, wallet_type: WalletType, n: usize, amount: Decimal) -> Payout {
        Payout {
            altcurrency: "BAT".into(),
            amount,
            currency: "BAT".into(),
            destination: format!("dest-{n}"),
            origin: format!("publishers#uuid:{n}"),
            channel: format!("site-{n}.com"),
            custodian,
            wallet_provider_id: format!("provider-{n}"),
            settlement_id: "settlement-1".into(),
            wallet_type,
            note: None,
            signed_tx: None,
        }
    }
}
