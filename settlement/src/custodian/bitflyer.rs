//! Bitflyer payouts are written unsigned; the upload step signs them
//! online with a short-lived token.

use std::path::Path;

use async_trait::async_trait;

use super::{Artifact, ArtifactContext, ArtifactError, GenerateArtifact};
use crate::transaction::{Payout, WalletKey};

#[derive(Debug, Clone, Copy, Default)]
pub struct BitflyerGenerator;

#[async_trait]
impl GenerateArtifact for BitflyerGenerator {
    async fn generate(
        &self,
        _ctx: &ArtifactContext<'_>,
        output_path: &Path,
        wallet_key: WalletKey,
        payouts: &[Payout],
    ) -> Result<Artifact, ArtifactError> {
        tracing::info!(wallet_key = %wallet_key, payouts = payouts.len(), "bitflyer payouts staged");
        Ok(Artifact::single(output_path, serde_json::to_vec_pretty(payouts)?))
    }
}
