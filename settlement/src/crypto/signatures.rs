//! # Signature Verification
//!
//! Ed25519 verification over raw byte arrays, plus decoding of public keys
//! in the two forms authorizers hand us: 64-char hex, or an OpenSSH
//! `ssh-ed25519 AAAA...` line.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

/// A raw 32-byte Ed25519 public key.
pub type PublicKeyBytes = [u8; 32];

/// Errors from signature verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid signature bytes")]
    InvalidSignatureBytes,

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Verifies an Ed25519 signature given raw key and signature bytes.
pub fn verify_raw(
    public_key: &PublicKeyBytes,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let vk = VerifyingKey::from_bytes(public_key).map_err(|_| SignatureError::InvalidPublicKey)?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| SignatureError::InvalidSignatureBytes)?;
    let sig = Signature::from_bytes(&sig_bytes);
    vk.verify(message, &sig)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Decodes a public key from hex or OpenSSH `ssh-ed25519` form.
pub fn decode_public_key(raw: &str) -> Result<PublicKeyBytes, SignatureError> {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("ssh-ed25519 ") {
        let blob = rest
            .split_whitespace()
            .next()
            .ok_or(SignatureError::InvalidPublicKey)?;
        let wire = STANDARD
            .decode(blob)
            .map_err(|_| SignatureError::InvalidPublicKey)?;
        return parse_ssh_wire(&wire);
    }

    let bytes = hex::decode(raw).map_err(|_| SignatureError::InvalidPublicKey)?;
    let key: PublicKeyBytes = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&key).map_err(|_| SignatureError::InvalidPublicKey)?;
    Ok(key)
}

/// Parses the SSH wire format: `string "ssh-ed25519"`, `string key`.
fn parse_ssh_wire(wire: &[u8]) -> Result<PublicKeyBytes, SignatureError> {
    let (algo, rest) = read_ssh_string(wire)?;
    if algo != b"ssh-ed25519" {
        return Err(SignatureError::InvalidPublicKey);
    }
    let (key, _) = read_ssh_string(rest)?;
    let key: PublicKeyBytes = key.try_into().map_err(|_| SignatureError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&key).map_err(|_| SignatureError::InvalidPublicKey)?;
    Ok(key)
}

fn read_ssh_string(buf: &[u8]) -> Result<(&[u8], &[u8]), SignatureError> {
    if buf.len() < 4 {
        return Err(SignatureError::InvalidPublicKey);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let body = &buf[4..];
    if body.len() < len {
        return Err(SignatureError::InvalidPublicKey);
    }
    Ok(body.split_at(len))
}
