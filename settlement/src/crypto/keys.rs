//! # Signing Keys
//!
//! Ed25519 keypairs used for custodian transfer signing and authorizer
//! identities.
//!
//! Key bytes are never logged. Only the hex public key may appear in log
//! fields or artifacts.

use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use thiserror::Error;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not hex")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 signing keypair.
///
/// Does not implement `Serialize`. Persisting the secret goes through
/// [`secret_key_bytes`](Self::secret_key_bytes) and the vault.
#[derive(Clone)]
pub struct SigningKeypair {
    signing_key: SigningKey,
}

impl SigningKeypair {
    /// Generates a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuilds a keypair from its 32-byte seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuilds a keypair from a hex-encoded seed.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Hex-encoded public key, the form used in artifacts and key lists.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Signs `message` and returns the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Exports the secret seed. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl std::fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_roundtrip_preserves_public_key() {
        let kp = SigningKeypair::generate();
        let restored = SigningKeypair::from_seed(&kp.secret_key_bytes());
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn from_hex_accepts_valid_seed() {
        let kp = SigningKeypair::generate();
        let restored = SigningKeypair::from_hex(&hex::encode(kp.secret_key_bytes())).unwrap();
        assert_eq!(kp.public_key_hex(), restored.public_key_hex());
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(SigningKeypair::from_hex("abcd").is_err());
        assert!(SigningKeypair::from_hex("zz").is_err());
    }

    #[test]
    fn debug_output_hides_secret() {
        let kp = SigningKeypair::from_seed(&[7u8; 32]);
        let rendered = format!("{:?}", kp);
        assert!(rendered.contains(&kp.public_key_hex()));
        assert!(!rendered.contains(&hex::encode(kp.secret_key_bytes())));
    }

    #[test]
    fn signatures_are_deterministic() {
        let kp = SigningKeypair::from_seed(&[1u8; 32]);
        assert_eq!(kp.sign(b"payout"), kp.sign(b"payout"));
    }
}
