//! Per-document authorization checks.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::AuthorizationError;
use crate::config::{AuthorizedKeys, ConfigError};
use crate::crypto::signatures::{decode_public_key, verify_raw, PublicKeyBytes};

/// Validates authorizer signatures against an environment-scoped key set
/// and enforces the submission threshold.
#[derive(Debug, Clone)]
pub struct AuthorizationVerifier {
    keys: Arc<AuthorizedKeys>,
    threshold: usize,
}

impl AuthorizationVerifier {
    pub fn new(keys: Arc<AuthorizedKeys>, threshold: usize) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        Ok(Self { keys, threshold })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Checks one signing event: `signature_b64` must be a valid Ed25519
    /// signature over the raw `document_id` bytes by a key listed for
    /// `environment`. Returns the decoded key.
    ///
    /// Membership is checked before the signature, so an unlisted key is
    /// rejected whether or not its signature verifies.
    pub fn verify_document_signature(
        &self,
        document_id: &str,
        public_key_hex: &str,
        signature_b64: &str,
        environment: &str,
    ) -> Result<PublicKeyBytes, AuthorizationError> {
        if document_id.is_empty() {
            return Err(AuthorizationError::EmptyDocumentId);
        }
        let key = decode_public_key(public_key_hex).map_err(|_| AuthorizationError::MalformedKey)?;
        if self.keys.len(environment) == 0 {
            return Err(AuthorizationError::UnknownEnvironment(environment.to_string()));
        }
        if !self.keys.contains(environment, &key) {
            tracing::warn!(environment, "authorization attempted with unlisted key");
            return Err(AuthorizationError::UnknownKey);
        }
        let signature = STANDARD
            .decode(signature_b64.trim())
            .map_err(|_| AuthorizationError::MalformedSignature)?;
        verify_raw(&key, document_id.as_bytes(), &signature)
            .map_err(|_| AuthorizationError::InvalidSignature)?;
        Ok(key)
    }

    /// Fails unless `distinct_authorizers` meets the threshold.
    pub fn check_threshold(&self, distinct_authorizers: usize) -> Result<(), AuthorizationError> {
        if distinct_authorizers < self.threshold {
            return Err(AuthorizationError::InsufficientAuthorizations {
                have: distinct_authorizers,
                need: self.threshold,
            });
        }
        Ok(())
    }
}
