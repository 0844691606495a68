//! # Vault Secret Store
//!
//! Encrypted secret storage addressed by wallet key strings
//! (`custodian-type`, e.g. `gemini-contribution`).
//!
//! ```text
//! secret.rs: wallet bundles and the master key file
//! store.rs : sled-backed mounts, signers and shared secrets
//! ```
//!
//! Every value is sealed with AES-256-GCM under a master key held outside
//! the database, with the record's `mount/name` path bound as associated
//! data. Logs carry wallet key names and byte lengths, never secret bytes.

pub mod secret;
pub mod store;

use thiserror::Error;

use crate::crypto::encryption::EncryptionError;

pub use secret::{load_master_key, write_master_key, WalletSecret};
pub use store::{VaultSecretStore, REQUIRED_MOUNTS};

/// Secret backend failures.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("mount {0} is not initialized; run vault init first")]
    NotMounted(&'static str),

    #[error("no secret stored at {mount}/{name}")]
    NotFound { mount: &'static str, name: String },

    #[error("vault storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("vault record could not be decrypted: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("vault record encoding error: {0}")]
    Serialization(String),

    #[error("stored secret at {0} is malformed")]
    Malformed(String),

    #[error("master key must be {} hex-encoded bytes", crate::config::AES_KEY_LENGTH)]
    InvalidMasterKey,

    #[error("key file already exists: {0}")]
    KeyFileExists(String),

    #[error("vault i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Only interrupted or timed-out storage I/O is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            VaultError::Storage(sled::Error::Io(e)) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
