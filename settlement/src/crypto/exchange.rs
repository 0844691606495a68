//! # Secret Exchange
//!
//! The payments service generates one X25519 keypair at start and publishes
//! the public half through its info endpoint. Operators seal wallet secrets
//! to that key; only this process instance can open them.
//!
//! ## Sealing
//!
//! 1. The sender generates an ephemeral X25519 keypair.
//! 2. Both sides compute the Diffie-Hellman output.
//! 3. The output, bound to both public keys, goes through BLAKE3
//!    `derive_key` to produce an AES-256 key.
//! 4. The secret is encrypted with AES-256-GCM (`nonce || ciphertext`).
//!
//! The raw DH output is never used as a key directly.

use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use super::encryption::{decrypt, encrypt, EncryptionError};
use crate::config::{AES_KEY_LENGTH, SECRET_EXCHANGE_KDF_CONTEXT, X25519_KEY_LENGTH};

/// Errors in the sealed-secret exchange.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("sender public key must be {X25519_KEY_LENGTH} bytes")]
    InvalidPublicKey,

    #[error("sealed secret could not be opened: {0}")]
    Open(#[from] EncryptionError),
}

/// Long-lived receiving keypair, immutable once created.
pub struct SecretExchange {
    secret: StaticSecret,
    public_key: PublicKey,
}

impl SecretExchange {
    /// Generates the service keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public_key = PublicKey::from(&secret);
        Self { secret, public_key }
    }

    pub fn public_key_bytes(&self) -> [u8; X25519_KEY_LENGTH] {
        self.public_key.to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Opens a secret sealed by [`seal`] for this keypair.
    pub fn open(&self, sender_public: &[u8], sealed: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        let sender: [u8; X25519_KEY_LENGTH] = sender_public
            .try_into()
            .map_err(|_| ExchangeError::InvalidPublicKey)?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(sender));
        let key = derive_key(shared.as_bytes(), &sender, &self.public_key.to_bytes());
        Ok(decrypt(&key, sealed)?)
    }
}

impl std::fmt::Debug for SecretExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretExchange")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Seals `plaintext` for `recipient`. Returns `(ephemeral_public, sealed)`.
pub fn seal(
    recipient: &[u8; X25519_KEY_LENGTH],
    plaintext: &[u8],
) -> Result<([u8; X25519_KEY_LENGTH], Vec<u8>), ExchangeError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient));
    let key = derive_key(shared.as_bytes(), &ephemeral_public, recipient);
    Ok((ephemeral_public, encrypt(&key, plaintext)?))
}

fn derive_key(
    shared: &[u8; 32],
    sender: &[u8; X25519_KEY_LENGTH],
    recipient: &[u8; X25519_KEY_LENGTH],
) -> [u8; AES_KEY_LENGTH] {
    let mut material = Vec::with_capacity(32 + 2 * X25519_KEY_LENGTH);
    material.extend_from_slice(shared);
    material.extend_from_slice(sender);
    material.extend_from_slice(recipient);
    blake3::derive_key(SECRET_EXCHANGE_KDF_CONTEXT, &material)
}
