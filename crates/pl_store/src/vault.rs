//! Vault: in-memory key material for findings encryption.
//!
//! The vault holds the 32-byte findings-encryption key in memory.  When the
//! operator locks the store, the key is zeroized.  Unlike an interactive
//! desktop vault there is no inactivity auto-lock: a multi-space scan can
//! legitimately run for hours, and losing the key mid-scan would turn every
//! event append into a fatal error.

use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::ZeroizeOnDrop;

use pl_crypto::kdf::{derive_subkey, generate_salt, vault_key_from_passphrase};

use crate::error::StoreError;

/// HKDF info label for the findings-encryption subkey.
const FINDINGS_KEY_INFO: &[u8] = b"findings";

#[derive(ZeroizeOnDrop)]
struct VaultInner {
    key: [u8; 32],
}

/// Thread-safe vault handle.  Clone to share across scan workers.
#[derive(Clone)]
pub struct Vault {
    inner: Arc<RwLock<Option<VaultInner>>>,
}

impl Vault {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Unlock with a passphrase and the salt stored next to the database.
    /// The passphrase-derived key never encrypts data directly; a
    /// purpose-bound subkey does.
    pub async fn unlock(&self, passphrase: &[u8], salt: &[u8; 16]) -> Result<(), StoreError> {
        let vault_key = vault_key_from_passphrase(passphrase, salt)?;
        let findings_key = derive_subkey(&vault_key.0, FINDINGS_KEY_INFO)?;
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner { key: findings_key });
        Ok(())
    }

    /// Unlock with an existing raw key (e.g. from an OS keyring).
    pub async fn unlock_with_key(&self, key: [u8; 32]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        *guard = Some(VaultInner { key });
        Ok(())
    }

    /// Lock the vault — zeroizes the key.
    pub async fn lock(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.is_none()
    }

    /// Access the raw key for an encrypt/decrypt operation.
    /// Returns Err if the vault is locked.
    pub async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[u8; 32]) -> Result<R, StoreError>,
    {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(inner) => f(&inner.key),
            None => Err(StoreError::VaultLocked),
        }
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a fresh salt for a new audit store.  Store it next to the DB
/// (not secret).
pub fn new_vault_salt() -> [u8; 16] {
    generate_salt()
}
