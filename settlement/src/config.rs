//! # Settlement Configuration & Constants
//!
//! Every fixed limit the pipeline depends on lives here: custodian batch
//! sizes, signature windows, retry budgets, and key lengths. Runtime
//! configuration (authorized keys, thresholds, environment) is modelled as
//! explicit immutable objects that callers construct and inject.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::signatures::{decode_public_key, PublicKeyBytes};

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

/// Maximum number of payouts in a single bulk-pay request.
pub const GEMINI_MAX_BLOCK_SIZE: usize = 500;

/// Number of precomputed signatures per block, one per nonce offset.
pub const GEMINI_SIGNATURE_WINDOW: usize = 10;

/// Request path embedded in every bulk-pay payload.
pub const GEMINI_BULK_PAY_PATH: &str = "/v1/payments/bulkPay";

/// Currency used when a transaction does not carry one.
pub const DEFAULT_PAYOUT_CURRENCY: &str = "BAT";

// ---------------------------------------------------------------------------
// PayPal
// ---------------------------------------------------------------------------

/// Hard per-batch row limit of the mass-pay CSV upload.
pub const PAYPAL_MAX_ROWS: usize = 5000;

/// Maximum length of a mass-pay reference id.
pub const PAYPAL_REF_ID_LENGTH: usize = 30;

/// Oldest acceptable conversion rate.
pub const RATE_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Timeout applied to every rate provider call.
pub const RATE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default local currency for mass-pay batches.
pub const PAYPAL_DEFAULT_CURRENCY: &str = "JPY";

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// First backoff delay after a transient ledger failure.
pub const LEDGER_RETRY_BASE: Duration = Duration::from_millis(20);

/// Upper bound on any single backoff delay.
pub const LEDGER_RETRY_CAP: Duration = Duration::from_secs(4);

/// Retries attempted after the initial try.
pub const LEDGER_RETRY_ATTEMPTS: u32 = 2;

/// Distinct authorizers required before a document may be submitted.
pub const DEFAULT_AUTHORIZATION_THRESHOLD: usize = 2;

/// Namespace for idempotency keys derived from payment details.
pub const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::from_u128(0x7478_c5a1_90b3_4c5e_9d1f_3a2b_6e84_0c17);

// ---------------------------------------------------------------------------
// Crypto
// ---------------------------------------------------------------------------

/// AES-256 key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// X25519 public key length in bytes.
pub const X25519_KEY_LENGTH: usize = 32;

/// Context string for deriving sealed-secret keys from X25519 output.
pub const SECRET_EXCHANGE_KDF_CONTEXT: &str = "settlement 2024-01-01 sealed wallet secret v1";

/// Headers the transport signature must cover on signed endpoints.
pub const SIGNED_REQUEST_HEADERS: [&str; 6] = [
    "(request-target)",
    "host",
    "date",
    "digest",
    "content-length",
    "content-type",
];

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Suffix appended to an input file stem to name its artifacts.
pub const SIGNED_FILE_SUFFIX: &str = "-signed.json";

/// Base file name used when all input files are merged.
pub const MERGED_OUTPUT_FILE: &str = "merged-signed.json";

// ---------------------------------------------------------------------------
// Authorized Keys
// ---------------------------------------------------------------------------

/// Errors raised while loading the authorized key set.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read authorized keys file: {0}")]
    Io(#[from] std::io::Error),

    #[error("authorized keys file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("environment {environment} lists a malformed public key at index {index}")]
    MalformedKey { environment: String, index: usize },

    #[error("authorization threshold must be at least 1")]
    ZeroThreshold,
}

/// Immutable mapping of environment name to the public keys allowed to
/// authorize payouts in that environment.
///
/// Built once at startup and handed to the verifier. Changing it requires a
/// restart.
#[derive(Debug, Clone, Default)]
pub struct AuthorizedKeys {
    environments: HashMap<String, Vec<PublicKeyBytes>>,
}

impl AuthorizedKeys {
    /// Builds the set from already-decoded keys.
    pub fn new(environments: HashMap<String, Vec<PublicKeyBytes>>) -> Self {
        Self { environments }
    }

    /// Parses `{"environment": ["<hex or ssh-ed25519 key>", ...]}`.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(raw)?;
        let mut environments = HashMap::with_capacity(parsed.len());
        for (environment, keys) in parsed {
            let mut decoded = Vec::with_capacity(keys.len());
            for (index, key) in keys.iter().enumerate() {
                let bytes = decode_public_key(key).map_err(|_| ConfigError::MalformedKey {
                    environment: environment.clone(),
                    index,
                })?;
                decoded.push(bytes);
            }
            environments.insert(environment, decoded);
        }
        Ok(Self { environments })
    }

    /// Reads and parses a JSON key file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// True when `key` is allowed in `environment`.
    pub fn contains(&self, environment: &str, key: &PublicKeyBytes) -> bool {
        self.environments
            .get(environment)
            .map(|keys| keys.iter().any(|k| k == key))
            .unwrap_or(false)
    }

    /// Number of keys configured for an environment.
    pub fn len(&self, environment: &str) -> usize {
        self.environments.get(environment).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.environments.values().all(Vec::is_empty)
    }
}

// ---------------------------------------------------------------------------
// Service Configuration
// ---------------------------------------------------------------------------

/// Runtime settings of the payments service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Environment whose authorized keys apply (e.g. `production`).
    pub environment: String,
    /// Distinct authorizers required before submission.
    pub threshold: usize,
    /// Namespace used to derive idempotency keys.
    pub idempotency_namespace: Uuid,
}

impl ServiceConfig {
    pub fn new(environment: impl Into<String>, threshold: usize) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        Ok(Self {
            environment: environment.into(),
            threshold,
            idempotency_namespace: IDEMPOTENCY_NAMESPACE,
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            threshold: DEFAULT_AUTHORIZATION_THRESHOLD,
            idempotency_namespace: IDEMPOTENCY_NAMESPACE,
        }
    }
}

// ---------------------------------------------------------------------------
// Sanity checks
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::SigningKeypair;

    #[test]
    fn limits_are_sane() {
        assert!(GEMINI_MAX_BLOCK_SIZE > 0);
        assert!(GEMINI_SIGNATURE_WINDOW > 0);
        assert!(PAYPAL_REF_ID_LENGTH <= 30);
        assert!(LEDGER_RETRY_BASE < LEDGER_RETRY_CAP);
        assert!(DEFAULT_AUTHORIZATION_THRESHOLD >= 2);
    }

    #[test]
    fn authorized_keys_from_json() {
        let kp = SigningKeypair::generate();
        let raw = format!(r#"{{"production": ["{}"], "staging": []}}"#, kp.public_key_hex());
        let keys = AuthorizedKeys::from_json(&raw).unwrap();

        assert!(keys.contains("production", &kp.public_key_bytes()));
        assert!(!keys.contains("staging", &kp.public_key_bytes()));
        assert!(!keys.contains("unknown", &kp.public_key_bytes()));
        assert_eq!(keys.len("production"), 1);
    }

    #[test]
    fn authorized_keys_rejects_malformed_entry() {
        let raw = r#"{"production": ["not-a-key"]}"#;
        let err = AuthorizedKeys::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedKey { index: 0, .. }));
    }

    #[test]
    fn zero_threshold_rejected() {
        assert!(matches!(
            ServiceConfig::new("production", 0),
            Err(ConfigError::ZeroThreshold)
        ));
    }
}
