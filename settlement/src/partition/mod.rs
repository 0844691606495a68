//! # Settlement Partitioning
//!
//! Drives one offline signing run:
//!
//! 1. parse every input file into payouts, skipping non-positive amounts;
//! 2. reject the run if two payouts anywhere in it share a reference id;
//! 3. bucket each file (or the merged list) by `custodian-type`;
//! 4. generate every bucket's artifact in memory;
//! 5. write all artifacts, read-only, or none of them.
//!
//! Any failure before step 5 leaves the output directory untouched. A
//! failure during step 5 removes whatever the run already wrote.

mod output;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{MERGED_OUTPUT_FILE, PAYPAL_DEFAULT_CURRENCY, SIGNED_FILE_SUFFIX};
use crate::custodian::{
    Artifact, ArtifactContext, ArtifactError, ArtifactGenerator, GenerateArtifact, GeminiGenerator, RateProvider,
};
use crate::transaction::{AntifraudRecord, Custodian, Payout, ValidationError, WalletKey};
use crate::vault::VaultSecretStore;

pub use output::write_all_or_nothing;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("no input files given")]
    NoInput,

    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decoding {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} record {index}: {source}")]
    Validation {
        path: PathBuf,
        index: usize,
        #[source]
        source: ValidationError,
    },

    #[error("reference id {reference} already seen in batch ({first} and {second})")]
    DuplicateReference {
        reference: String,
        first: String,
        second: String,
    },

    #[error("generating {wallet_key}: {source}")]
    Artifact {
        wallet_key: String,
        #[source]
        source: ArtifactError,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub out_dir: PathBuf,
    /// Treat all input files as one list.
    pub merge: bool,
    /// Collapse Uphold payouts sharing a custodian wallet id.
    pub merge_custodial: bool,
    /// Custodians to process; others are left out of the run.
    pub providers: Vec<Custodian>,
    /// Local currency for mass-pay conversion.
    pub payout_currency: String,
    /// Fixed first nonce for bulk-pay blocks, mostly for reproducible runs.
    pub gemini_base_nonce: Option<i64>,
}

impl PartitionOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            merge: false,
            merge_custodial: false,
            providers: Custodian::ALL.to_vec(),
            payout_currency: PAYPAL_DEFAULT_CURRENCY.to_string(),
            gemini_base_nonce: None,
        }
    }
}

/// One bucket of one input group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    pub wallet_key: WalletKey,
    pub group: String,
    pub payouts: usize,
}

/// What a completed run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionReport {
    pub files: Vec<PathBuf>,
    pub buckets: Vec<BucketSummary>,
    pub skipped: usize,
}

/// Payouts from one input file, in file order.
struct InputGroup {
    name: String,
    payouts: Vec<(String, Payout)>,
}

pub struct SettlementPartitioner<'a> {
    vault: &'a VaultSecretStore,
    rates: &'a dyn RateProvider,
    options: PartitionOptions,
}

impl<'a> SettlementPartitioner<'a> {
    pub fn new(vault: &'a VaultSecretStore, rates: &'a dyn RateProvider, options: PartitionOptions) -> Self {
        Self { vault, rates, options }
    }

    pub fn options(&self) -> &PartitionOptions {
        &self.options
    }

    /// Runs the whole pipeline over `inputs`.
    pub async fn run(&self, inputs: &[PathBuf]) -> Result<PartitionReport, PartitionError> {
        if inputs.is_empty() {
            return Err(PartitionError::NoInput);
        }

        let mut skipped = 0;
        let mut groups = Vec::with_capacity(inputs.len());
        for path in inputs {
            let (group, dropped) = load_group(path)?;
            skipped += dropped;
            groups.push(group);
        }
        check_unique_references(&groups)?;

        if self.options.merge {
            let payouts = groups.into_iter().flat_map(|g| g.payouts).collect();
            groups = vec![InputGroup {
                name: String::new(),
                payouts,
            }];
        }

        let ctx = ArtifactContext {
            vault: self.vault,
            rates: self.rates,
            payout_currency: self.options.payout_currency.clone(),
            merge_custodial: self.options.merge_custodial,
        };

        let mut artifacts: Vec<Artifact> = Vec::new();
        let mut buckets = Vec::new();
        for group in &groups {
            for (wallet_key, payouts) in self.bucket(group) {
                let path = self.output_path(wallet_key, &group.name);
                let generator = self.generator_for(wallet_key.custodian);
                let artifact = generator
                    .generate(&ctx, &path, wallet_key, &payouts)
                    .await
                    .map_err(|source| PartitionError::Artifact {
                        wallet_key: wallet_key.to_string(),
                        source,
                    })?;
                buckets.push(BucketSummary {
                    wallet_key,
                    group: group.name.clone(),
                    payouts: payouts.len(),
                });
                artifacts.push(artifact);
            }
        }

        let files = write_all_or_nothing(&self.options.out_dir, &artifacts)?;
        tracing::info!(
            inputs = inputs.len(),
            buckets = buckets.len(),
            files = files.len(),
            skipped,
            "settlement run complete"
        );
        Ok(PartitionReport {
            files,
            buckets,
            skipped,
        })
    }

    /// Buckets in processing order, restricted to the selected providers.
    fn bucket(&self, group: &InputGroup) -> Vec<(WalletKey, Vec<Payout>)> {
        let mut by_key: BTreeMap<WalletKey, Vec<Payout>> = BTreeMap::new();
        for (_, payout) in &group.payouts {
            if self.options.providers.contains(&payout.custodian) {
                by_key.entry(payout.wallet_key()).or_default().push(payout.clone());
            }
        }
        WalletKey::all_for(&self.options.providers)
            .into_iter()
            .filter_map(|key| by_key.remove(&key).map(|payouts| (key, payouts)))
            .collect()
    }

    fn output_path(&self, wallet_key: WalletKey, group: &str) -> PathBuf {
        let name = if self.options.merge {
            format!("{wallet_key}-{MERGED_OUTPUT_FILE}")
        } else {
            format!("{wallet_key}-{group}{SIGNED_FILE_SUFFIX}")
        };
        self.options.out_dir.join(name)
    }

    fn generator_for(&self, custodian: Custodian) -> ArtifactGenerator {
        match (custodian, self.options.gemini_base_nonce) {
            (Custodian::Gemini, Some(nonce)) => ArtifactGenerator::Gemini(GeminiGenerator::with_base_nonce(nonce)),
            _ => ArtifactGenerator::for_custodian(custodian),
        }
    }
}

fn load_group(path: &Path) -> Result<(InputGroup, usize), PartitionError> {
    let raw = std::fs::read(path).map_err(|source| PartitionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<AntifraudRecord> = serde_json::from_slice(&raw).map_err(|source| PartitionError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut payouts = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for (index, record) in records.into_iter().enumerate() {
        match record.into_payout() {
            Ok(payout) => payouts.push((format!("{}#{index}", path.display()), payout)),
            Err(ValidationError::NonPositiveAmount(amount)) => {
                tracing::warn!(file = %path.display(), index, %amount, "skipping non-positive payout");
                skipped += 1;
            }
            Err(source) => {
                return Err(PartitionError::Validation {
                    path: path.to_path_buf(),
                    index,
                    source,
                })
            }
        }
    }
    tracing::info!(file = %path.display(), payouts = payouts.len(), skipped, "input parsed");
    Ok((InputGroup { name, payouts }, skipped))
}

fn check_unique_references(groups: &[InputGroup]) -> Result<(), PartitionError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for (position, payout) in groups.iter().flat_map(|g| g.payouts.iter()) {
        let reference = payout.reference_id();
        if let Some(first) = seen.get(&reference) {
            return Err(PartitionError::DuplicateReference {
                reference,
                first: first.to_string(),
                second: position.clone(),
            });
        }
        seen.insert(reference, position);
    }
    Ok(())
}
