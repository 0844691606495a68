//! # Gemini Bulk-Pay Artifacts
//!
//! Payouts are split into ordered blocks of at most
//! [`GEMINI_MAX_BLOCK_SIZE`]. Each block becomes one bulk-pay payload
//! signed ahead of time for [`GEMINI_SIGNATURE_WINDOW`] consecutive nonces,
//! so the upload step can pick whichever nonce the exchange still accepts.
//!
//! Signature `i` of a block is
//! `hex(HMAC-SHA384(secret, base64(json(payload with nonce = base + i))))`.
//! The artifact carries the API key reference, never the HMAC secret.

use std::ops::Range;
use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Artifact, ArtifactContext, ArtifactError, GenerateArtifact};
use crate::config::{GEMINI_BULK_PAY_PATH, GEMINI_MAX_BLOCK_SIZE, GEMINI_SIGNATURE_WINDOW};
use crate::crypto::hash::reference_id;
use crate::crypto::mac::hmac_sha384_hex;
use crate::transaction::{Payout, WalletKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPayload {
    pub tx_ref: String,
    pub amount: Decimal,
    pub currency: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkPayoutPayload {
    pub request: String,
    pub nonce: i64,
    pub payouts: Vec<PayoutPayload>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// One block, ready for upload with any of its pre-signed nonces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateRequestSequence {
    pub base: BulkPayoutPayload,
    pub signatures: Vec<String>,
    pub apikey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Block bounds for `total` items: `ceil(total / size)` ranges, each
/// clamped to `[i * size, min((i + 1) * size, total))`.
pub fn block_ranges(total: usize, size: usize) -> Vec<Range<usize>> {
    if size == 0 {
        return Vec::new();
    }
    (0..total.div_ceil(size))
        .map(|i| i * size..((i + 1) * size).min(total))
        .collect()
}

/// Deterministic transfer reference for one payout.
pub fn tx_ref(payout: &Payout) -> String {
    reference_id(
        &[
            &payout.settlement_id,
            payout.wallet_type.as_str(),
            &payout.destination,
            &payout.channel,
        ],
        "_",
    )
}

/// Computes the signature window for `payload`, starting at its nonce.
pub fn sign_window(secret: &[u8], payload: &BulkPayoutPayload) -> Result<Vec<String>, ArtifactError> {
    let mut candidate = payload.clone();
    let mut signatures = Vec::with_capacity(GEMINI_SIGNATURE_WINDOW);
    for offset in 0..GEMINI_SIGNATURE_WINDOW as i64 {
        candidate.nonce = payload.nonce + offset;
        let serialized = STANDARD.encode(serde_json::to_vec(&candidate)?);
        signatures.push(hmac_sha384_hex(secret, serialized.as_bytes())?);
    }
    Ok(signatures)
}

#[derive(Debug, Clone, Default)]
pub struct GeminiGenerator {
    base_nonce: Option<i64>,
}

impl GeminiGenerator {
    /// Fixes the first block's nonce instead of using the clock.
    pub fn with_base_nonce(nonce: i64) -> Self {
        Self {
            base_nonce: Some(nonce),
        }
    }

    fn base_nonce(&self) -> i64 {
        self.base_nonce.unwrap_or_else(|| {
            let now = Utc::now();
            now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros())
        })
    }

    /// Builds the signed request sequences without encoding them.
    pub fn build_sequences(
        &self,
        client_id: &str,
        api_key: &str,
        account: Option<&str>,
        secret: &[u8],
        payouts: &[Payout],
    ) -> Result<Vec<PrivateRequestSequence>, ArtifactError> {
        let base_nonce = self.base_nonce();
        let mut sequences = Vec::new();
        for (i, range) in block_ranges(payouts.len(), GEMINI_MAX_BLOCK_SIZE).into_iter().enumerate() {
            let block = &payouts[range];
            let payload = BulkPayoutPayload {
                request: GEMINI_BULK_PAY_PATH.to_string(),
                // Blocks never share a nonce within their windows.
                nonce: base_nonce + (i * GEMINI_SIGNATURE_WINDOW) as i64,
                payouts: block
                    .iter()
                    .map(|p| PayoutPayload {
                        tx_ref: tx_ref(p),
                        amount: p.amount,
                        currency: p.currency.clone(),
                        destination: p.destination.clone(),
                        account: account.map(str::to_string),
                    })
                    .collect(),
                client_id: client_id.to_string(),
                account: account.map(str::to_string),
            };
            let signatures = sign_window(secret, &payload)?;
            sequences.push(PrivateRequestSequence {
                base: payload,
                signatures,
                apikey: api_key.to_string(),
                account: account.map(str::to_string),
            });
        }
        Ok(sequences)
    }
}

#[async_trait]
impl GenerateArtifact for GeminiGenerator {
    async fn generate(
        &self,
        ctx: &ArtifactContext<'_>,
        output_path: &Path,
        wallet_key: WalletKey,
        payouts: &[Payout],
    ) -> Result<Artifact, ArtifactError> {
        let key = wallet_key.to_string();
        let wallet = ctx.vault.get_wallet(&key)?;
        let missing = |field| ArtifactError::MissingCredential {
            wallet_key: key.clone(),
            field,
        };
        let client_id = wallet.client_id.as_deref().ok_or_else(|| missing("clientId"))?;
        let api_key = wallet.client_key.as_deref().ok_or_else(|| missing("clientKey"))?;
        let secret = ctx.vault.get_shared_secret(&key)?;

        let sequences = self.build_sequences(client_id, api_key, wallet.account.as_deref(), &secret, payouts)?;
        tracing::info!(
            wallet_key = %key,
            payouts = payouts.len(),
            blocks = sequences.len(),
            "gemini bulk-pay blocks signed"
        );
        Ok(Artifact::single(output_path, serde_json::to_vec(&sequences)?))
    }
}
