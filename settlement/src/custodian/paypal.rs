//! # PayPal Mass-Pay Artifacts
//!
//! BAT amounts are converted into the local payout currency at a single
//! rate fetched for the run, floored to the currency's minor unit. Two files
//! come out of one bucket:
//!
//! - `<name>.json`, the reconciliation records (payout plus conversion);
//! - `<name>.csv`, the upload sheet: a `PAYOUT_SUMMARY` line followed by
//!   one `PAYOUT` row per payout.
//!
//! Reference ids must be unique within a batch and a batch is capped at
//! [`PAYPAL_MAX_ROWS`] rows.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::rates::fetch_rate_checked;
use super::{Artifact, ArtifactContext, ArtifactError, ArtifactFile, GenerateArtifact};
use crate::config::{DEFAULT_PAYOUT_CURRENCY, PAYPAL_MAX_ROWS, PAYPAL_REF_ID_LENGTH};
use crate::crypto::hash::truncated_reference_id;
use crate::transaction::{Payout, WalletKey};

/// Local currencies mass-pay batches can be issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutCurrency {
    Jpy,
    Usd,
}

impl PayoutCurrency {
    pub fn parse(code: &str) -> Result<Self, ArtifactError> {
        match code.trim().to_ascii_uppercase().as_str() {
            "JPY" => Ok(PayoutCurrency::Jpy),
            "USD" => Ok(PayoutCurrency::Usd),
            other => Err(ArtifactError::UnsupportedCurrency(other.to_string())),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PayoutCurrency::Jpy => "JPY",
            PayoutCurrency::Usd => "USD",
        }
    }

    /// Digits after the decimal point.
    pub fn scale(&self) -> u32 {
        match self {
            PayoutCurrency::Jpy => 0,
            PayoutCurrency::Usd => 2,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            PayoutCurrency::Jpy => "¥",
            PayoutCurrency::Usd => "$",
        }
    }

    /// `rate * bat`, floored to the minor unit.
    pub fn convert(&self, bat: Decimal, rate: Decimal) -> Decimal {
        (bat * rate).round_dp_with_strategy(self.scale(), RoundingStrategy::ToNegativeInfinity)
    }
}

/// One reconciliation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaypalRecord {
    #[serde(flatten)]
    pub payout: Payout,
    pub ref_id: String,
    pub local_amount: Decimal,
    pub local_currency: String,
    pub rate: Decimal,
}

/// Reference id over the normalized destination and channel.
pub fn paypal_ref_id(payout: &Payout) -> String {
    let destination = payout.destination.trim().to_ascii_lowercase();
    let channel = payout.channel.trim().to_ascii_lowercase();
    truncated_reference_id(&[&destination, &channel], "_", PAYPAL_REF_ID_LENGTH)
}

fn note(bat: Decimal, currency: PayoutCurrency, amount: Decimal) -> String {
    let points = match currency {
        PayoutCurrency::Jpy => " Points for JPY",
        PayoutCurrency::Usd => "",
    };
    format!(
        "You earned {} {}{}, as {}{} from 1 channel(s).",
        bat.normalize(),
        DEFAULT_PAYOUT_CURRENCY,
        points,
        currency.symbol(),
        amount
    )
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[&str]) -> String {
    let mut line = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaypalGenerator;

impl PaypalGenerator {
    /// Converts and checks a batch at `rate`.
    pub fn build_records(
        &self,
        currency: PayoutCurrency,
        rate: Decimal,
        payouts: &[Payout],
    ) -> Result<Vec<PaypalRecord>, ArtifactError> {
        if payouts.len() > PAYPAL_MAX_ROWS {
            return Err(ArtifactError::TooManyRows {
                rows: payouts.len(),
                limit: PAYPAL_MAX_ROWS,
            });
        }
        let mut seen: HashMap<String, usize> = HashMap::with_capacity(payouts.len());
        let mut records = Vec::with_capacity(payouts.len());
        for (row, payout) in payouts.iter().enumerate() {
            let ref_id = paypal_ref_id(payout);
            if let Some(&first) = seen.get(&ref_id) {
                return Err(ArtifactError::DuplicateReference {
                    reference: ref_id,
                    first,
                    second: row,
                });
            }
            seen.insert(ref_id.clone(), row);
            records.push(PaypalRecord {
                payout: payout.clone(),
                ref_id,
                local_amount: currency.convert(payout.amount, rate),
                local_currency: currency.code().to_string(),
                rate,
            });
        }
        Ok(records)
    }

    /// Renders the upload sheet.
    pub fn render_csv(&self, currency: PayoutCurrency, records: &[PaypalRecord]) -> String {
        let total: Decimal = records.iter().map(|r| r.local_amount).sum();
        let mut out = csv_line(&[
            "PAYOUT_SUMMARY",
            &total.to_string(),
            currency.code(),
            &records.len().to_string(),
        ]);
        for record in records {
            let amount = record.local_amount.to_string();
            out.push_str(&csv_line(&[
                "PAYOUT",
                &record.payout.destination,
                &amount,
                currency.code(),
                &record.ref_id,
                &note(record.payout.amount, currency, record.local_amount),
                "PayPal",
            ]));
        }
        out
    }
}

#[async_trait]
impl GenerateArtifact for PaypalGenerator {
    async fn generate(
        &self,
        ctx: &ArtifactContext<'_>,
        output_path: &Path,
        wallet_key: WalletKey,
        payouts: &[Payout],
    ) -> Result<Artifact, ArtifactError> {
        let currency = PayoutCurrency::parse(&ctx.payout_currency)?;
        let rate = fetch_rate_checked(ctx.rates, DEFAULT_PAYOUT_CURRENCY, currency.code()).await?;
        let records = self.build_records(currency, rate, payouts)?;
        let csv = self.render_csv(currency, &records);
        tracing::info!(
            wallet_key = %wallet_key,
            rows = records.len(),
            currency = currency.code(),
            rate = %rate,
            "mass-pay batch converted"
        );
        Ok(Artifact {
            files: vec![
                ArtifactFile {
                    path: output_path.with_extension("json"),
                    contents: serde_json::to_vec_pretty(&records)?,
                },
                ArtifactFile {
                    path: output_path.with_extension("csv"),
                    contents: csv.into_bytes(),
                },
            ],
        })
    }
}
