//! # Uphold Transfer Artifacts
//!
//! Each payout becomes one transfer request signed with the wallet's
//! Ed25519 signer and carried inside the payout as `signedTx`. The signer
//! is created on first use and reused afterwards, so the published
//! `walletInfo.publicKey` stays stable across runs.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Artifact, ArtifactContext, ArtifactError, GenerateArtifact};
use crate::authorization::httpsig::{RequestParts, SignatureParams, SignedRequest, DIGEST_HEADER};
use crate::config::DEFAULT_PAYOUT_CURRENCY;
use crate::crypto::keys::SigningKeypair;
use crate::transaction::{Payout, WalletKey};

const PROVIDER: &str = "uphold";
const SIGNATURE_KEY_ID: &str = "primary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub public_key: String,
    pub provider: String,
    pub provider_id: String,
    pub altcurrency: String,
}

/// The artifact written for one Uphold bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpholdArtifact {
    pub wallet_info: WalletInfo,
    pub transactions: Vec<Payout>,
}

#[derive(Debug, Serialize)]
struct Denomination {
    amount: Decimal,
    currency: &'static str,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    denomination: Denomination,
    destination: &'a str,
    message: &'a str,
}

/// Signs one transfer and returns the encapsulated request, base64-encoded.
pub fn sign_transfer(
    signer: &SigningKeypair,
    card_id: &str,
    payout: &Payout,
) -> Result<String, ArtifactError> {
    let body = serde_json::to_vec(&TransferRequest {
        denomination: Denomination {
            amount: payout.amount,
            currency: DEFAULT_PAYOUT_CURRENCY,
        },
        destination: &payout.destination,
        message: payout.note.as_deref().unwrap_or(&payout.settlement_id),
    })?;
    let mut req = RequestParts::new("POST", &format!("/v0/me/cards/{card_id}/transactions"), body);
    let params = SignatureParams::ed25519(SIGNATURE_KEY_ID, &[DIGEST_HEADER]);
    params.sign(signer, &mut req)?;
    let encapsulated = SignedRequest::encapsulate(&params, &req)?;
    Ok(STANDARD.encode(serde_json::to_vec(&encapsulated)?))
}

/// Collapses payouts that share a custodian wallet id, summing amounts.
/// First occurrence order is kept.
pub fn merge_by_custodial_wallet(payouts: &[Payout]) -> Vec<Payout> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut merged: Vec<Payout> = Vec::with_capacity(payouts.len());
    for payout in payouts {
        match index.get(payout.wallet_provider_id.as_str()) {
            Some(&at) => merged[at].amount += payout.amount,
            None => {
                index.insert(&payout.wallet_provider_id, merged.len());
                merged.push(payout.clone());
            }
        }
    }
    merged
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpholdGenerator;

impl UpholdGenerator {
    pub fn build(
        &self,
        signer: &SigningKeypair,
        provider_id: &str,
        payouts: Vec<Payout>,
    ) -> Result<UpholdArtifact, ArtifactError> {
        let transactions = payouts
            .into_iter()
            .map(|mut payout| -> Result<Payout, ArtifactError> {
                payout.signed_tx = Some(sign_transfer(signer, provider_id, &payout)?);
                Ok(payout)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UpholdArtifact {
            wallet_info: WalletInfo {
                public_key: signer.public_key_hex(),
                provider: PROVIDER.to_string(),
                provider_id: provider_id.to_string(),
                altcurrency: DEFAULT_PAYOUT_CURRENCY.to_string(),
            },
            transactions,
        })
    }
}

#[async_trait]
impl GenerateArtifact for UpholdGenerator {
    async fn generate(
        &self,
        ctx: &ArtifactContext<'_>,
        output_path: &Path,
        wallet_key: WalletKey,
        payouts: &[Payout],
    ) -> Result<Artifact, ArtifactError> {
        let key = wallet_key.to_string();
        let wallet = ctx.vault.get_wallet(&key)?;
        let signer = ctx.vault.generate_signer(&key)?;

        let payouts = if ctx.merge_custodial {
            merge_by_custodial_wallet(payouts)
        } else {
            payouts.to_vec()
        };
        let artifact = self.build(&signer, &wallet.provider_id, payouts)?;
        tracing::info!(
            wallet_key = %key,
            transfers = artifact.transactions.len(),
            public_key = %artifact.wallet_info.public_key,
            "uphold transfers signed"
        );
        Ok(Artifact::single(output_path, serde_json::to_vec_pretty(&artifact)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::httpsig::{verify_request, SIGNATURE_HEADER};
    use crate::crypto::signatures::PublicKeyBytes;
    use crate::custodian::test_support::{mounted_vault, payout};
    use crate::custodian::FixedRateProvider;
    use crate::transaction::{Custodian, WalletType};
    use crate::vault::WalletSecret;
    use std::collections::HashMap;

    fn uphold(n: usize, amount: i64) -> Payout {
        payout(Custodian::Uphold, WalletType::Contribution, n, Decimal::new(amount, 0))
    }

    #[test]
    fn test_signed_transfer_verifies() {
        let signer = SigningKeypair::generate();
        let encoded = sign_transfer(&signer, "card-1", &uphold(1, 3)).unwrap();
        let signed: SignedRequest = serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();

        let body: serde_json::Value = serde_json::from_str(&signed.octets).unwrap();
        assert_eq!(body["denomination"]["amount"], "3");
        assert_eq!(body["denomination"]["currency"], "BAT");
        assert_eq!(body["destination"], "dest-1");
        assert_eq!(body["message"], "settlement-1");

        let mut req = RequestParts::new("POST", "/v0/me/cards/card-1/transactions", signed.octets.into_bytes());
        req.set_header(DIGEST_HEADER, signed.headers[DIGEST_HEADER].clone());
        req.set_header(SIGNATURE_HEADER, signed.headers[SIGNATURE_HEADER].clone());
        let mut keys: HashMap<String, PublicKeyBytes> = HashMap::new();
        keys.insert(SIGNATURE_KEY_ID.into(), signer.public_key_bytes());
        assert_eq!(verify_request(&keys, &[DIGEST_HEADER], &req).unwrap(), "primary");
    }

    #[test]
    fn test_merge_sums_by_wallet_id() {
        let mut a = uphold(1, 2);
        let mut b = uphold(2, 5);
        let c = uphold(3, 1);
        a.wallet_provider_id = "shared".into();
        b.wallet_provider_id = "shared".into();
        let merged = merge_by_custodial_wallet(&[a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].amount, Decimal::new(7, 0));
        assert_eq!(merged[0].destination, "dest-1");
        assert_eq!(merged[1].wallet_provider_id, "provider-3");
    }

    #[tokio::test]
    async fn test_generate_reuses_signer_across_runs() {
        let vault = mounted_vault();
        let key = WalletKey::new(Custodian::Uphold, WalletType::Contribution);
        vault.put_wallet(&key.to_string(), &WalletSecret::new("card-1")).unwrap();
        let rates = FixedRateProvider::new();
        let ctx = ArtifactContext {
            vault: &vault,
            rates: &rates,
            payout_currency: "JPY".into(),
            merge_custodial: false,
        };
        let payouts = vec![uphold(1, 3), uphold(2, 4)];

        let first = UpholdGenerator
            .generate(&ctx, Path::new("uphold.json"), key, &payouts)
            .await
            .unwrap();
        let second = UpholdGenerator
            .generate(&ctx, Path::new("uphold.json"), key, &payouts)
            .await
            .unwrap();

        let a: UpholdArtifact = serde_json::from_slice(&first.files[0].contents).unwrap();
        let b: UpholdArtifact = serde_json::from_slice(&second.files[0].contents).unwrap();
        assert_eq!(a.wallet_info.public_key, b.wallet_info.public_key);
        assert_eq!(a.wallet_info.provider, "uphold");
        assert_eq!(a.wallet_info.provider_id, "card-1");
        assert_eq!(a.transactions.len(), 2);
        assert!(a.transactions.iter().all(|t| t.signed_tx.is_some()));
    }

    #[tokio::test]
    async fn test_generate_requires_wallet_bundle() {
        let vault = mounted_vault();
        let rates = FixedRateProvider::new();
        let ctx = ArtifactContext {
            vault: &vault,
            rates: &rates,
            payout_currency: "JPY".into(),
            merge_custodial: false,
        };
        let key = WalletKey::new(Custodian::Uphold, WalletType::Referral);
        let err = UpholdGenerator
            .generate(&ctx, Path::new("x.json"), key, &[uphold(1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Vault(_)));
    }
}
