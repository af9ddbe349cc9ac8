//! Database abstraction over SQLite via sqlx.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};

use crate::checkpoint::CheckpointStore;
use crate::error::StoreError;
use crate::events::EventStore;
use crate::severity_counts::SeverityCountStore;
use crate::vault::Vault;

/// Associated data binding ciphertexts to this store format.
pub(crate) const FINDINGS_AAD: &[u8] = b"pl-findings-v1";

/// Central store handle.  Cheap to clone (Arc internally).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    pub vault: Vault,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path`.
    /// Runs all pending migrations automatically.
    ///
    /// WAL journal mode and foreign-key enforcement are configured at
    /// connection time here, not inside a migration — SQLite forbids
    /// changing `journal_mode` inside a transaction and sqlx wraps every
    /// migration in one.
    pub async fn open(db_path: &Path, vault: Vault) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;
        crate::migrations::run_migrations(&pool).await?;
        Ok(Self { pool, vault })
    }

    /// In-memory store for tests and dry runs.
    ///
    /// Pinned to a single pooled connection: every sqlite `:memory:`
    /// connection is its own database, so a larger pool would hand out
    /// empty databases for all but the first connection.
    pub async fn open_in_memory(vault: Vault) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        crate::migrations::run_migrations(&pool).await?;
        Ok(Self { pool, vault })
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.pool.clone())
    }

    pub fn severity_counts(&self) -> SeverityCountStore {
        SeverityCountStore::new(self.pool.clone())
    }

    pub fn events(&self) -> EventStore {
        EventStore::new(self.clone())
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Encrypt a plaintext value with the vault key.
    pub async fn encrypt_value(&self, plaintext: &[u8]) -> Result<String, StoreError> {
        self.vault
            .with_key(|key| {
                let ct = pl_crypto::aead::encrypt(key, plaintext, FINDINGS_AAD)
                    .map_err(StoreError::Crypto)?;
                Ok(base64::Engine::encode(
                    &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                    &ct,
                ))
            })
            .await
    }

    /// Decrypt a vault-encrypted value.
    pub async fn decrypt_value(&self, b64: &str) -> Result<Vec<u8>, StoreError> {
        let ct = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, b64)
            .map_err(|e| StoreError::Crypto(pl_crypto::CryptoError::Base64Decode(e)))?;

        self.vault
            .with_key(|key| {
                let pt = pl_crypto::aead::decrypt(key, &ct, FINDINGS_AAD)
                    .map_err(StoreError::Crypto)?;
                Ok(pt.to_vec())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::Store;
    use crate::vault::Vault;

    #[tokio::test]
    async fn encrypt_round_trips_through_the_vault() {
        let vault = Vault::new();
        vault.unlock_with_key([1u8; 32]).await.unwrap();
        let store = Store::open_in_memory(vault).await.expect("open store");

        let ct = store.encrypt_value(b"06 12 34 56 78").await.unwrap();
        assert_ne!(ct.as_bytes(), b"06 12 34 56 78");
        let pt = store.decrypt_value(&ct).await.unwrap();
        assert_eq!(pt, b"06 12 34 56 78");
    }

    #[tokio::test]
    async fn encrypt_fails_when_vault_locked() {
        let store = Store::open_in_memory(Vault::new()).await.expect("open store");
        assert!(store.encrypt_value(b"secret").await.is_err());
    }
}
