//! # Hashing
//!
//! SHA-256 digests and the deterministic reference ids derived from them.
//! Reference ids are base58 (Bitcoin alphabet) so they stay alphanumeric
//! and safe to paste into custodian upload forms.

use sha2::{Digest, Sha256};

/// Computes SHA-256 and returns the 32-byte digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes `parts` joined by `separator` and base58-encodes the digest.
pub fn reference_id(parts: &[&str], separator: &str) -> String {
    let key = parts.join(separator);
    bs58::encode(sha256(key.as_bytes())).into_string()
}

/// Like [`reference_id`] but truncated to at most `max_len` characters.
pub fn truncated_reference_id(parts: &[&str], separator: &str, max_len: usize) -> String {
    let mut id = reference_id(parts, separator);
    id.truncate(max_len);
    id
}

/// Base64 of the SHA-256 digest, formatted as an HTTP `Digest` header value.
pub fn digest_header_value(body: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    format!("SHA-256={}", STANDARD.encode(sha256(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_reference_id_is_deterministic_and_alphanumeric() {
        let a = reference_id(&["settlement", "contribution", "dest", "brave.com"], "_");
        let b = reference_id(&["settlement", "contribution", "dest", "brave.com"], "_");
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_reference_id_depends_on_every_part() {
        let a = reference_id(&["s1", "dest", "brave.com"], "_");
        let b = reference_id(&["s2", "dest", "brave.com"], "_");
        assert_ne!(a, b);
    }

    #[test]
    fn test_truncated_reference_id_length() {
        let id = truncated_reference_id(&["publisher", "channel"], "", 30);
        assert_eq!(id.len(), 30);
    }

    #[test]
    fn test_digest_header_value() {
        // SHA-256 of the empty string.
        assert_eq!(
            digest_header_value(b""),
            "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }
}
