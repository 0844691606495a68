//! Wallet secret bundles and the vault master key file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::VaultError;
use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::generate_key;

/// Custodian-assigned identifiers and credentials for one wallet key.
///
/// `client_key` is the API key reference handed to the custodian alongside
/// signatures; it is not the signing secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSecret {
    /// Custodian wallet / card / account identifier.
    pub provider_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

impl WalletSecret {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            client_id: None,
            client_key: None,
            account: None,
        }
    }
}

impl std::fmt::Debug for WalletSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSecret")
            .field("provider_id", &self.provider_id)
            .field("client_id", &self.client_id)
            .field("client_key", &self.client_key.as_ref().map(|_| "<redacted>"))
            .field("account", &self.account)
            .finish()
    }
}

/// Writes a fresh hex-encoded master key. Refuses to overwrite.
pub fn write_master_key(path: &Path) -> Result<[u8; AES_KEY_LENGTH], VaultError> {
    if path.exists() {
        return Err(VaultError::KeyFileExists(path.display().to_string()));
    }
    let key = generate_key();
    std::fs::write(path, hex::encode(key))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(key)
}

/// Reads a master key written by [`write_master_key`].
pub fn load_master_key(path: &Path) -> Result<[u8; AES_KEY_LENGTH], VaultError> {
    let raw = std::fs::read_to_string(path)?;
    let bytes = hex::decode(raw.trim()).map_err(|_| VaultError::InvalidMasterKey)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::InvalidMasterKey)
}
