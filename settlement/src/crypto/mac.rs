//! HMAC-SHA384, the MAC the Gemini-style bulk-pay API expects.

use hmac::{Hmac, Mac};
use sha2::Sha384;
use thiserror::Error;

type HmacSha384 = Hmac<Sha384>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("hmac key rejected")]
pub struct MacError;

/// Returns the hex-encoded HMAC-SHA384 of `message` under `secret`.
pub fn hmac_sha384_hex(secret: &[u8], message: &[u8]) -> Result<String, MacError> {
    let mut mac = HmacSha384::new_from_slice(secret).map_err(|_| MacError)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
