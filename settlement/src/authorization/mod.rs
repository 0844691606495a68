//! # Authorization
//!
//! Two independent controls gate the online payments path:
//!
//! - **Document signatures** ([`AuthorizationVerifier`]): each authorizer
//!   signs the raw document id; submission requires a threshold of
//!   distinct authorized keys.
//! - **Transport signatures** ([`httpsig`]): signed endpoints require an
//!   HTTP signature over a fixed header set from a key the keystore knows.

pub mod httpsig;
pub mod verifier;

use thiserror::Error;

pub use httpsig::{verify_request, AuthorizedKeystore, HttpSignatureError, Keystore, RequestParts, SignatureParams};
pub use verifier::AuthorizationVerifier;

/// Rejected authorization. Messages never reveal the configured keys.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("document id must not be empty")]
    EmptyDocumentId,

    #[error("no authorized keys configured for environment {0}")]
    UnknownEnvironment(String),

    #[error("public key is not authorized for this environment")]
    UnknownKey,

    #[error("public key is malformed")]
    MalformedKey,

    #[error("signature is not valid base64")]
    MalformedSignature,

    #[error("signature does not match the document")]
    InvalidSignature,

    #[error("document has {have} distinct authorizations, {need} required")]
    InsufficientAuthorizations { have: usize, need: usize },
}
