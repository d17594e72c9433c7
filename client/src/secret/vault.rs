//! # Encrypted Vault
//!
//! A password-protected snapshot directory holding one mnemonic.
//!
//! ## Layout
//!
//! sled tree `vault`:
//!
//! | Key        | Value                                   |
//! |------------|-----------------------------------------|
//! | `mnemonic` | `bincode(SealedRecord)`                 |
//!
//! A [`SealedRecord`] carries the Argon2id salt and cost parameters next to
//! the AES-256-GCM ciphertext, so a snapshot opens with the parameters it
//! was written with.
//!
//! The password stays in memory (zeroized on drop); the mnemonic is only
//! decrypted for the duration of a derivation. Key derivation runs on the
//! blocking pool.
//!
//! sled locks a snapshot directory for as long as it is open, so a client
//! opens each path once through its [`VaultRegistry`] and every manager built
//! for that path shares the handle.

use std::fmt;
use std::path::{Path, PathBuf};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::info;
use zeroize::Zeroizing;

use super::mnemonic::{mnemonic_to_seed, verify_mnemonic};
use crate::config::VAULT_SALT_LENGTH;
use crate::crypto::encryption::{decrypt, derive_key, encrypt, KdfParams};
use crate::error::{Error, Result};

const TREE: &str = "vault";
const MNEMONIC_KEY: &[u8] = b"mnemonic";

#[derive(Debug, Serialize, Deserialize)]
struct SealedRecord {
    salt: Vec<u8>,
    kdf: KdfParams,
    ciphertext: Vec<u8>,
}

pub struct VaultSecretManager {
    db: Db,
    tree: Tree,
    path: PathBuf,
    password: Option<Zeroizing<String>>,
    kdf: KdfParams,
}

impl fmt::Debug for VaultSecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSecretManager")
            .field("path", &self.path)
            .field("unlocked", &self.password.is_some())
            .finish()
    }
}

fn storage_error(err: sled::Error) -> Error {
    tracing::warn!(error = %err, "vault storage failure");
    Error::BackendLocked
}

fn open_snapshot(path: &Path) -> Result<(Db, Tree)> {
    let db = sled::open(path).map_err(storage_error)?;
    let tree = db.open_tree(TREE).map_err(storage_error)?;
    Ok((db, tree))
}

/// Snapshots opened by one client, keyed by path.
#[derive(Default)]
pub struct VaultRegistry {
    snapshots: DashMap<PathBuf, (Db, Tree)>,
}

impl VaultRegistry {
    /// A manager over the snapshot at `path`, opening it on first use.
    pub fn open(&self, path: impl AsRef<Path>, password: Option<String>) -> Result<VaultSecretManager> {
        let path = path.as_ref().to_path_buf();
        let (db, tree) = match self.snapshots.entry(path.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(open_snapshot(&path)?).value().clone(),
        };
        Ok(VaultSecretManager::from_parts(db, tree, path, password))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl fmt::Debug for VaultRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultRegistry")
            .field("open", &self.snapshots.len())
            .finish()
    }
}

impl VaultSecretManager {
    /// Opens (or creates) the snapshot at `path`, outside any registry.
    /// Without a password the vault stays locked.
    pub fn open(path: impl AsRef<Path>, password: Option<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (db, tree) = open_snapshot(&path)?;
        Ok(Self::from_parts(db, tree, path, password))
    }

    fn from_parts(db: Db, tree: Tree, path: PathBuf, password: Option<String>) -> Self {
        Self {
            db,
            tree,
            path,
            password: password.map(Zeroizing::new),
            kdf: KdfParams::default(),
        }
    }

    /// Cost parameters for records written from now on.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.password.is_none()
    }

    pub fn set_password(&mut self, password: String) {
        self.password = Some(Zeroizing::new(password));
    }

    pub fn clear_password(&mut self) {
        self.password = None;
    }

    pub fn has_mnemonic(&self) -> Result<bool> {
        self.tree.contains_key(MNEMONIC_KEY).map_err(storage_error)
    }

    fn password(&self) -> Result<Zeroizing<String>> {
        self.password.clone().ok_or(Error::BackendLocked)
    }

    /// Seals `mnemonic` under the vault password. A vault holds one
    /// mnemonic for its whole life.
    pub async fn store_mnemonic(&self, mnemonic: &str) -> Result<()> {
        let password = self.password()?;
        if self.has_mnemonic()? {
            return Err(Error::AlreadyInitialized);
        }
        verify_mnemonic(mnemonic)?;

        let mut salt = vec![0u8; VAULT_SALT_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let kdf = self.kdf;
        let plaintext = Zeroizing::new(mnemonic.split_whitespace().collect::<Vec<_>>().join(" "));
        let record = tokio::task::spawn_blocking(move || -> Result<SealedRecord> {
            let key = derive_key(&password, &salt, kdf)?;
            let ciphertext = encrypt(&key, plaintext.as_bytes())?;
            Ok(SealedRecord {
                salt,
                kdf,
                ciphertext,
            })
        })
        .await
        .map_err(|_| Error::BackendLocked)??;

        let bytes = bincode::serialize(&record)
            .map_err(|_| Error::Validation("vault record could not be encoded".into()))?;
        // Guards against a concurrent store between the check and the write.
        self.tree
            .compare_and_swap(MNEMONIC_KEY, None as Option<&[u8]>, Some(bytes))
            .map_err(storage_error)?
            .map_err(|_| Error::AlreadyInitialized)?;
        self.db.flush_async().await.map_err(storage_error)?;
        info!(path = %self.path.display(), "mnemonic stored in vault");
        Ok(())
    }

    /// Decrypts the stored mnemonic and returns its BIP39 seed.
    pub(crate) async fn seed(&self) -> Result<Zeroizing<Vec<u8>>> {
        let password = self.password()?;
        let bytes = self
            .tree
            .get(MNEMONIC_KEY)
            .map_err(storage_error)?
            .ok_or_else(|| Error::Derivation("the vault holds no mnemonic".into()))?;
        let record: SealedRecord =
            bincode::deserialize(&bytes).map_err(|_| Error::BackendLocked)?;

        tokio::task::spawn_blocking(move || -> Result<Zeroizing<Vec<u8>>> {
            let key = derive_key(&password, &record.salt, record.kdf)?;
            let mnemonic = Zeroizing::new(decrypt(&key, &record.ciphertext)?);
            let phrase = std::str::from_utf8(&mnemonic).map_err(|_| Error::BackendLocked)?;
            mnemonic_to_seed(phrase)
        })
        .await
        .map_err(|_| Error::BackendLocked)?
    }
}
