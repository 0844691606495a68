//! Sled-backed implementation of the vault secret store.
//!
//! | Tree         | Key                 | Value                          |
//! |--------------|---------------------|--------------------------------|
//! | `sys/mounts` | mount name          | `json(MountInfo)`              |
//! | `wallets`    | wallet key          | `seal(bincode(WalletSecret))`  |
//! | `transit`    | `signer/<key>`      | `seal(ed25519 seed)`           |
//! | `transit`    | `hmac/<key>`        | `seal(shared secret bytes)`    |

use std::path::Path;

use chrono::{DateTime, Utc};
use ed25519_dalek::SECRET_KEY_LENGTH;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use super::{VaultError, VaultResult, WalletSecret};
use crate::config::AES_KEY_LENGTH;
use crate::crypto::encryption::{decrypt_with_aad, encrypt_with_aad};
use crate::crypto::keys::SigningKeypair;

pub const WALLETS_MOUNT: &str = "wallets";
pub const TRANSIT_MOUNT: &str = "transit";

/// Mounts that must exist before any secret is read or written.
pub const REQUIRED_MOUNTS: [&str; 2] = [WALLETS_MOUNT, TRANSIT_MOUNT];

const MOUNT_TABLE: &str = "sys/mounts";

#[derive(Debug, Serialize, Deserialize)]
struct MountInfo {
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct VaultSecretStore {
    db: Db,
    mounts: Tree,
    master_key: [u8; AES_KEY_LENGTH],
}

impl std::fmt::Debug for VaultSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretStore").finish_non_exhaustive()
    }
}

impl VaultSecretStore {
    pub fn open<P: AsRef<Path>>(path: P, master_key: [u8; AES_KEY_LENGTH]) -> VaultResult<Self> {
        Self::from_db(sled::open(path)?, master_key)
    }

    pub fn open_temporary(master_key: [u8; AES_KEY_LENGTH]) -> VaultResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?, master_key)
    }

    fn from_db(db: Db, master_key: [u8; AES_KEY_LENGTH]) -> VaultResult<Self> {
        let mounts = db.open_tree(MOUNT_TABLE)?;
        Ok(Self {
            db,
            mounts,
            master_key,
        })
    }

    // -- Mounts -------------------------------------------------------------

    /// Ensures every required mount exists. Returns the ones created now.
    pub fn generate_mounts(&self) -> VaultResult<Vec<&'static str>> {
        let mut created = Vec::new();
        for name in REQUIRED_MOUNTS {
            let info = serde_json::to_vec(&MountInfo {
                created_at: Utc::now(),
            })
            .map_err(|e| VaultError::Serialization(e.to_string()))?;
            let swapped = self.mounts.compare_and_swap(name, None as Option<&[u8]>, Some(info))?;
            if swapped.is_ok() {
                self.db.open_tree(name)?;
                created.push(name);
            }
        }
        self.db.flush()?;
        tracing::info!(created = ?created, "vault mounts ensured");
        Ok(created)
    }

    pub fn is_mounted(&self, name: &str) -> VaultResult<bool> {
        Ok(self.mounts.contains_key(name)?)
    }

    fn mount(&self, name: &'static str) -> VaultResult<Tree> {
        if !self.is_mounted(name)? {
            return Err(VaultError::NotMounted(name));
        }
        Ok(self.db.open_tree(name)?)
    }

    // -- Sealed records -----------------------------------------------------

    fn seal(&self, mount: &str, name: &str, plaintext: &[u8]) -> VaultResult<Vec<u8>> {
        let aad = format!("{mount}/{name}");
        Ok(encrypt_with_aad(&self.master_key, plaintext, aad.as_bytes())?)
    }

    fn open_record(&self, mount: &str, name: &str, sealed: &[u8]) -> VaultResult<Vec<u8>> {
        let aad = format!("{mount}/{name}");
        Ok(decrypt_with_aad(&self.master_key, sealed, aad.as_bytes())?)
    }

    fn put(&self, mount: &'static str, name: &str, plaintext: &[u8]) -> VaultResult<()> {
        let tree = self.mount(mount)?;
        let sealed = self.seal(mount, name, plaintext)?;
        tree.insert(name, sealed)?;
        tree.flush()?;
        Ok(())
    }

    fn get(&self, mount: &'static str, name: &str) -> VaultResult<Vec<u8>> {
        let tree = self.mount(mount)?;
        let sealed = tree.get(name)?.ok_or_else(|| VaultError::NotFound {
            mount,
            name: name.to_string(),
        })?;
        self.open_record(mount, name, &sealed)
    }

    // -- Signers ------------------------------------------------------------

    /// Returns the Ed25519 signer for `wallet_key`, generating it on first
    /// use. Concurrent first calls converge on a single key.
    pub fn generate_signer(&self, wallet_key: &str) -> VaultResult<SigningKeypair> {
        let tree = self.mount(TRANSIT_MOUNT)?;
        let name = format!("signer/{wallet_key}");

        if tree.contains_key(&name)? {
            return self.get_signer(wallet_key);
        }

        let candidate = SigningKeypair::generate();
        let sealed = self.seal(TRANSIT_MOUNT, &name, &candidate.secret_key_bytes())?;
        match tree.compare_and_swap(&name, None as Option<&[u8]>, Some(sealed))? {
            Ok(()) => {
                tree.flush()?;
                tracing::info!(
                    wallet_key,
                    public_key = %candidate.public_key_hex(),
                    "signer generated"
                );
                Ok(candidate)
            }
            Err(_) => self.get_signer(wallet_key),
        }
    }

    /// Stores an existing seed as the signer for `wallet_key`.
    pub fn import_signer(&self, wallet_key: &str, seed: &[u8; SECRET_KEY_LENGTH]) -> VaultResult<SigningKeypair> {
        let name = format!("signer/{wallet_key}");
        self.put(TRANSIT_MOUNT, &name, seed)?;
        let signer = SigningKeypair::from_seed(seed);
        tracing::info!(wallet_key, public_key = %signer.public_key_hex(), "signer imported");
        Ok(signer)
    }

    pub fn get_signer(&self, wallet_key: &str) -> VaultResult<SigningKeypair> {
        let name = format!("signer/{wallet_key}");
        let seed = self.get(TRANSIT_MOUNT, &name)?;
        let seed: [u8; SECRET_KEY_LENGTH] = seed
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::Malformed(format!("{TRANSIT_MOUNT}/{name}")))?;
        Ok(SigningKeypair::from_seed(&seed))
    }

    // -- Shared secrets -----------------------------------------------------

    pub fn import_shared_secret(&self, wallet_key: &str, secret: &[u8]) -> VaultResult<()> {
        self.put(TRANSIT_MOUNT, &format!("hmac/{wallet_key}"), secret)?;
        tracing::info!(wallet_key, bytes = secret.len(), "shared secret imported");
        Ok(())
    }

    pub fn get_shared_secret(&self, wallet_key: &str) -> VaultResult<Vec<u8>> {
        self.get(TRANSIT_MOUNT, &format!("hmac/{wallet_key}"))
    }

    // -- Wallet bundles -----------------------------------------------------

    pub fn put_wallet(&self, wallet_key: &str, wallet: &WalletSecret) -> VaultResult<()> {
        let bytes = bincode::serialize(wallet).map_err(|e| VaultError::Serialization(e.to_string()))?;
        self.put(WALLETS_MOUNT, wallet_key, &bytes)?;
        tracing::info!(wallet_key, bytes = bytes.len(), "wallet bundle stored");
        Ok(())
    }

    pub fn get_wallet(&self, wallet_key: &str) -> VaultResult<WalletSecret> {
        let bytes = self.get(WALLETS_MOUNT, wallet_key)?;
        bincode::deserialize(&bytes).map_err(|_| VaultError::Malformed(format!("{WALLETS_MOUNT}/{wallet_key}")))
    }

    /// Names of all stored wallet bundles.
    pub fn wallet_keys(&self) -> VaultResult<Vec<String>> {
        self.mount(WALLETS_MOUNT)?
            .iter()
            .keys()
            .map(|k| -> VaultResult<String> { Ok(String::from_utf8_lossy(&k?).into_owned()) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::{generate_key, EncryptionError};

    fn mounted() -> VaultSecretStore {
        let store = VaultSecretStore::open_temporary(generate_key()).unwrap();
        store.generate_mounts().unwrap();
        store
    }

    #[test]
    fn test_mounts_are_idempotent() {
        let store = VaultSecretStore::open_temporary(generate_key()).unwrap();
        assert_eq!(store.generate_mounts().unwrap(), REQUIRED_MOUNTS.to_vec());
        assert!(store.generate_mounts().unwrap().is_empty());
        assert!(store.is_mounted(WALLETS_MOUNT).unwrap());
    }

    #[test]
    fn test_unmounted_access_rejected() {
        let store = VaultSecretStore::open_temporary(generate_key()).unwrap();
        assert!(matches!(
            store.get_shared_secret("gemini-referral"),
            Err(VaultError::NotMounted(TRANSIT_MOUNT))
        ));
        assert!(matches!(
            store.put_wallet("gemini-referral", &WalletSecret::new("x")),
            Err(VaultError::NotMounted(WALLETS_MOUNT))
        ));
    }

    #[test]
    fn test_generate_signer_is_stable() {
        let store = mounted();
        let first = store.generate_signer("uphold-contribution").unwrap();
        let second = store.generate_signer("uphold-contribution").unwrap();
        let other = store.generate_signer("uphold-referral").unwrap();
        assert_eq!(first.public_key_hex(), second.public_key_hex());
        assert_ne!(first.public_key_hex(), other.public_key_hex());
    }

    #[test]
    fn test_import_signer_then_get() {
        let store = mounted();
        let imported = store.import_signer("uphold-referral", &[9u8; 32]).unwrap();
        assert_eq!(
            store.get_signer("uphold-referral").unwrap().public_key_hex(),
            imported.public_key_hex()
        );
        assert_eq!(
            store.generate_signer("uphold-referral").unwrap().public_key_hex(),
            imported.public_key_hex()
        );
    }

    #[test]
    fn test_shared_secret_roundtrip() {
        let store = mounted();
        store.import_shared_secret("gemini-contribution", b"hmac-secret").unwrap();
        assert_eq!(store.get_shared_secret("gemini-contribution").unwrap(), b"hmac-secret");
        assert!(matches!(
            store.get_shared_secret("gemini-referral"),
            Err(VaultError::NotFound { .. })
        ));
    }

    #[test]
    fn test_wallet_bundle_roundtrip() {
        let store = mounted();
        let mut wallet = WalletSecret::new("provider-1");
        wallet.client_id = Some("client-1".into());
        wallet.client_key = Some("api-key".into());
        store.put_wallet("gemini-contribution", &wallet).unwrap();

        assert_eq!(store.get_wallet("gemini-contribution").unwrap(), wallet);
        assert_eq!(store.wallet_keys().unwrap(), vec!["gemini-contribution".to_string()]);
    }

    #[test]
    fn test_wrong_master_key_cannot_read() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = VaultSecretStore::open(dir.path(), [1u8; 32]).unwrap();
            store.generate_mounts().unwrap();
            store.import_shared_secret("gemini-referral", b"secret").unwrap();
        }
        let store = VaultSecretStore::open(dir.path(), [2u8; 32]).unwrap();
        assert!(matches!(
            store.get_shared_secret("gemini-referral"),
            Err(VaultError::Encryption(EncryptionError::DecryptFailed))
        ));
    }

    #[test]
    fn test_records_bound_to_their_path() {
        let store = mounted();
        store.import_shared_secret("gemini-referral", b"secret").unwrap();
        let transit = store.db.open_tree(TRANSIT_MOUNT).unwrap();
        let sealed = transit.get("hmac/gemini-referral").unwrap().unwrap();
        transit.insert("hmac/gemini-contribution", sealed).unwrap();
        assert!(store.get_shared_secret("gemini-contribution").is_err());
    }
}
