//! # Cryptographic Primitives
//!
//! Thin wrappers over audited implementations:
//!
//! - **Ed25519** for authorizer signatures and custodian transfer signing.
//! - **HMAC-SHA384** for the bulk-pay signature window.
//! - **AES-256-GCM** for vault records and sealed secrets.
//! - **X25519 + BLAKE3** for the secret-exchange key.
//! - **SHA-256** for digests and reference ids.

pub mod encryption;
pub mod exchange;
pub mod hash;
pub mod keys;
pub mod mac;
pub mod signatures;

pub use encryption::{decrypt, encrypt};
pub use exchange::SecretExchange;
pub use hash::{reference_id, sha256};
pub use keys::SigningKeypair;
pub use mac::hmac_sha384_hex;
pub use signatures::{decode_public_key, verify_raw, PublicKeyBytes};
