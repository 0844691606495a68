//! # HTTP Message Signatures
//!
//! Signing and verification of HTTP requests in the `Signature` header
//! format:
//!
//! ```text
//! Signature: keyId="<id>",algorithm="ed25519",headers="digest date",signature="<base64>"
//! ```
//!
//! The signing string is one `name: value` line per covered header, joined
//! by `\n`. Two pseudo-values are computed rather than read:
//!
//! - `(request-target)` is the lowercased method, a space, and the request
//!   URI (path plus query);
//! - `digest` is always recomputed from the body as `SHA-256=<base64>`.
//!
//! The types here are transport-agnostic; the service converts its HTTP
//! requests into [`RequestParts`] at the edge.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthorizedKeys;
use crate::crypto::hash::digest_header_value;
use crate::crypto::keys::SigningKeypair;
use crate::crypto::signatures::{decode_public_key, verify_raw, PublicKeyBytes};

pub const SIGNATURE_HEADER: &str = "signature";
pub const DIGEST_HEADER: &str = "digest";
pub const REQUEST_TARGET: &str = "(request-target)";
pub const ED25519_ALGORITHM: &str = "ed25519";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HttpSignatureError {
    #[error("request carries no signature header")]
    MissingSignature,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signed header {0} is missing from the request")]
    MissingHeader(String),

    #[error("digest header does not match the request body")]
    DigestMismatch,

    #[error("no verifier matching keyId {0}")]
    UnknownKey(String),

    #[error("signature is not valid")]
    InvalidSignature,
}

// ---------------------------------------------------------------------------
// Request representation
// ---------------------------------------------------------------------------

/// The parts of an HTTP request that a signature can cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParts {
    pub method: String,
    /// Path and query, e.g. `/v1/payments/submit?dry=1`.
    pub uri: String,
    /// Header values keyed by lowercased name.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RequestParts {
    pub fn new(method: &str, uri: &str, body: Vec<u8>) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Signature parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub key_id: String,
    pub algorithm: String,
    /// Lowercased names of covered headers, in signing order.
    pub headers: Vec<String>,
}

impl SignatureParams {
    pub fn ed25519(key_id: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm: ED25519_ALGORITHM.to_string(),
            headers: headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    /// Parses a `Signature` header value into parameters and raw signature
    /// bytes.
    pub fn parse(value: &str) -> Result<(Self, Vec<u8>), HttpSignatureError> {
        if value.trim().is_empty() {
            return Err(HttpSignatureError::MissingSignature);
        }
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers = None;
        let mut signature = None;

        for part in value.split(',') {
            let (name, raw) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| HttpSignatureError::Malformed(format!("bad parameter {part}")))?;
            let unquoted = raw
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| HttpSignatureError::Malformed(format!("unquoted {name}")))?;
            match name {
                "keyId" => key_id = Some(unquoted.to_string()),
                "algorithm" => algorithm = Some(unquoted.to_string()),
                "headers" => {
                    headers = Some(unquoted.split(' ').map(str::to_string).collect::<Vec<_>>())
                }
                "signature" => signature = Some(unquoted.to_string()),
                other => {
                    return Err(HttpSignatureError::Malformed(format!("unknown parameter {other}")))
                }
            }
        }

        let (Some(key_id), Some(algorithm), Some(signature)) = (key_id, algorithm, signature) else {
            return Err(HttpSignatureError::Malformed(
                "keyId, algorithm and signature are required".into(),
            ));
        };
        if key_id.is_empty() || signature.is_empty() {
            return Err(HttpSignatureError::Malformed("empty keyId or signature".into()));
        }
        let headers = headers.unwrap_or_else(|| vec!["date".to_string()]);
        if headers.iter().any(|h| *h != h.to_ascii_lowercase()) {
            return Err(HttpSignatureError::Malformed("header names must be lowercase".into()));
        }
        let signature = STANDARD
            .decode(signature)
            .map_err(|_| HttpSignatureError::Malformed("signature is not base64".into()))?;

        Ok((
            Self {
                key_id,
                algorithm,
                headers,
            },
            signature,
        ))
    }

    /// Formats the `Signature` header value.
    pub fn to_header(&self, signature: &[u8]) -> String {
        format!(
            "keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            self.algorithm,
            self.headers.join(" "),
            STANDARD.encode(signature)
        )
    }

    /// Builds the string the signature is computed over.
    pub fn signing_string(&self, req: &RequestParts) -> Result<String, HttpSignatureError> {
        let mut lines = Vec::with_capacity(self.headers.len());
        for name in &self.headers {
            let value = match name.as_str() {
                REQUEST_TARGET => format!("{} {}", req.method.to_ascii_lowercase(), req.uri),
                DIGEST_HEADER => digest_header_value(&req.body),
                other => req
                    .header(other)
                    .ok_or_else(|| HttpSignatureError::MissingHeader(other.to_string()))?
                    .to_string(),
            };
            lines.push(format!("{name}: {value}"));
        }
        Ok(lines.join("\n"))
    }

    /// Signs `req` in place, setting `digest` (when covered) and `signature`.
    pub fn sign(&self, signer: &SigningKeypair, req: &mut RequestParts) -> Result<(), HttpSignatureError> {
        if self.headers.iter().any(|h| h == DIGEST_HEADER) {
            req.set_header(DIGEST_HEADER, digest_header_value(&req.body));
        }
        let signing_string = self.signing_string(req)?;
        let signature = signer.sign(signing_string.as_bytes());
        req.set_header(SIGNATURE_HEADER, self.to_header(&signature));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Key lookup
// ---------------------------------------------------------------------------

/// Resolves the public key a request claims to be signed with.
pub trait Keystore: Send + Sync {
    fn lookup_verifier(&self, key_id: &str) -> Option<PublicKeyBytes>;
}

impl Keystore for HashMap<String, PublicKeyBytes> {
    fn lookup_verifier(&self, key_id: &str) -> Option<PublicKeyBytes> {
        self.get(key_id).copied()
    }
}

/// Keystore over one environment of the authorized key set. The `keyId`
/// is the signer's public key in hex or `ssh-ed25519` form.
#[derive(Debug, Clone)]
pub struct AuthorizedKeystore {
    keys: Arc<AuthorizedKeys>,
    environment: String,
}

impl AuthorizedKeystore {
    pub fn new(keys: Arc<AuthorizedKeys>, environment: impl Into<String>) -> Self {
        Self {
            keys,
            environment: environment.into(),
        }
    }
}

impl Keystore for AuthorizedKeystore {
    fn lookup_verifier(&self, key_id: &str) -> Option<PublicKeyBytes> {
        let key = decode_public_key(key_id).ok()?;
        self.keys.contains(&self.environment, &key).then_some(key)
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies a signed request over the `required` header set, ignoring the
/// header list the client declared. Returns the verified `keyId`.
pub fn verify_request(
    keystore: &dyn Keystore,
    required: &[&str],
    req: &RequestParts,
) -> Result<String, HttpSignatureError> {
    let header = req
        .header(SIGNATURE_HEADER)
        .ok_or(HttpSignatureError::MissingSignature)?;
    let (declared, signature) = SignatureParams::parse(header)?;
    if declared.algorithm != ED25519_ALGORITHM {
        return Err(HttpSignatureError::UnsupportedAlgorithm(declared.algorithm));
    }

    if required.contains(&DIGEST_HEADER) {
        let provided = req
            .header(DIGEST_HEADER)
            .ok_or_else(|| HttpSignatureError::MissingHeader(DIGEST_HEADER.to_string()))?;
        if provided != digest_header_value(&req.body) {
            return Err(HttpSignatureError::DigestMismatch);
        }
    }

    let public_key = keystore
        .lookup_verifier(&declared.key_id)
        .ok_or_else(|| HttpSignatureError::UnknownKey(declared.key_id.clone()))?;

    let enforced = SignatureParams::ed25519(declared.key_id.clone(), required);
    let signing_string = enforced.signing_string(req)?;
    verify_raw(&public_key, signing_string.as_bytes(), &signature)
        .map_err(|_| HttpSignatureError::InvalidSignature)?;
    Ok(declared.key_id)
}

// ---------------------------------------------------------------------------
// Encapsulation
// ---------------------------------------------------------------------------

/// A signed request carried as data: covered headers plus the signature
/// header, and the body as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub headers: BTreeMap<String, String>,
    pub octets: String,
}

impl SignedRequest {
    pub fn encapsulate(params: &SignatureParams, req: &RequestParts) -> Result<Self, HttpSignatureError> {
        let mut headers = BTreeMap::new();
        for name in &params.headers {
            let value = match name.as_str() {
                REQUEST_TARGET => format!("{} {}", req.method.to_ascii_lowercase(), req.uri),
                other => req
                    .header(other)
                    .ok_or_else(|| HttpSignatureError::MissingHeader(other.to_string()))?
                    .to_string(),
            };
            headers.insert(name.clone(), value);
        }
        let signature = req
            .header(SIGNATURE_HEADER)
            .ok_or(HttpSignatureError::MissingSignature)?;
        headers.insert(SIGNATURE_HEADER.to_string(), signature.to_string());
        let octets = String::from_utf8(req.body.clone())
            .map_err(|_| HttpSignatureError::Malformed("body is not utf-8".into()))?;
        Ok(Self { headers, octets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SIGNED_REQUEST_HEADERS;

    fn signed_submit(signer: &SigningKeypair) -> RequestParts {
        let mut req = RequestParts::new("POST", "/v1/payments/submit", br#"{"documentId":"d"}"#.to_vec())
            .with_header("Host", "payments.local")
            .with_header("Date", "Tue, 07 Jun 2024 20:51:35 GMT")
            .with_header("Content-Length", "18")
            .with_header("Content-Type", "application/json");
        SignatureParams::ed25519(signer.public_key_hex(), &SIGNED_REQUEST_HEADERS)
            .sign(signer, &mut req)
            .unwrap();
        req
    }

    fn keystore(signer: &SigningKeypair) -> HashMap<String, PublicKeyBytes> {
        HashMap::from([(signer.public_key_hex(), signer.public_key_bytes())])
    }

    #[test]
    fn test_header_roundtrip() {
        let params = SignatureParams::ed25519("primary", &["digest", "date"]);
        let header = params.to_header(&[7u8; 64]);
        let (parsed, sig) = SignatureParams::parse(&header).unwrap();
        assert_eq!(parsed, params);
        assert_eq!(sig, vec![7u8; 64]);
    }

    #[test]
    fn test_parse_rejects_incomplete_header() {
        assert!(matches!(
            SignatureParams::parse(r#"keyId="a",algorithm="ed25519""#),
            Err(HttpSignatureError::Malformed(_))
        ));
        assert_eq!(SignatureParams::parse(""), Err(HttpSignatureError::MissingSignature));
        assert!(SignatureParams::parse(r#"keyId="a",algorithm="ed25519",foo="b",signature="AA==""#).is_err());
    }

    #[test]
    fn test_signing_string_layout() {
        let req = RequestParts::new("GET", "/foo?param=value&pet=dog", b"{\"hello\": \"world\"}".to_vec())
            .with_header("Host", "example.com");
        let params = SignatureParams::ed25519("k", &["(request-target)", "host", "digest"]);
        let s = params.signing_string(&req).unwrap();
        assert_eq!(
            s,
            "(request-target): get /foo?param=value&pet=dog\n\
             host: example.com\n\
             digest: SHA-256=X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE="
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = SigningKeypair::generate();
        let req = signed_submit(&signer);
        let key_id = verify_request(&keystore(&signer), &SIGNED_REQUEST_HEADERS, &req).unwrap();
        assert_eq!(key_id, signer.public_key_hex());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signer = SigningKeypair::generate();
        let mut req = signed_submit(&signer);
        req.body = br#"{"documentId":"e"}"#.to_vec();
        assert_eq!(
            verify_request(&keystore(&signer), &SIGNED_REQUEST_HEADERS, &req),
            Err(HttpSignatureError::DigestMismatch)
        );
    }

    #[test]
    fn test_tampered_header_rejected() {
        let signer = SigningKeypair::generate();
        let mut req = signed_submit(&signer);
        req.set_header("date", "Wed, 08 Jun 2024 20:51:35 GMT");
        assert_eq!(
            verify_request(&keystore(&signer), &SIGNED_REQUEST_HEADERS, &req),
            Err(HttpSignatureError::InvalidSignature)
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let signer = SigningKeypair::generate();
        let req = signed_submit(&signer);
        let other = SigningKeypair::generate();
        assert!(matches!(
            verify_request(&keystore(&other), &SIGNED_REQUEST_HEADERS, &req),
            Err(HttpSignatureError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_missing_covered_header_rejected() {
        let signer = SigningKeypair::generate();
        let mut req = signed_submit(&signer);
        req.headers.remove("content-type");
        assert_eq!(
            verify_request(&keystore(&signer), &SIGNED_REQUEST_HEADERS, &req),
            Err(HttpSignatureError::MissingHeader("content-type".into()))
        );
    }

    #[test]
    fn test_authorized_keystore_scopes_environment() {
        let signer = SigningKeypair::generate();
        let keys = AuthorizedKeys::new(HashMap::from([(
            "production".to_string(),
            vec![signer.public_key_bytes()],
        )]));
        let keys = Arc::new(keys);
        let prod = AuthorizedKeystore::new(keys.clone(), "production");
        let staging = AuthorizedKeystore::new(keys, "staging");
        assert!(prod.lookup_verifier(&signer.public_key_hex()).is_some());
        assert!(staging.lookup_verifier(&signer.public_key_hex()).is_none());
        assert!(prod.lookup_verifier("garbage").is_none());
    }

    #[test]
    fn test_encapsulate_digest_only() {
        let signer = SigningKeypair::from_seed(&[3u8; 32]);
        let mut req = RequestParts::new("POST", "/v0/me/cards/x/transactions", b"{\"a\":1}".to_vec());
        let params = SignatureParams::ed25519("primary", &["digest"]);
        params.sign(&signer, &mut req).unwrap();
        let enc = SignedRequest::encapsulate(&params, &req).unwrap();
        assert_eq!(enc.octets, "{\"a\":1}");
        assert_eq!(enc.headers.len(), 2);
        assert!(enc.headers["signature"].starts_with("keyId=\"primary\",algorithm=\"ed25519\""));
        assert!(enc.headers["digest"].starts_with("SHA-256="));
    }
}
