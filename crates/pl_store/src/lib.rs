//! pl_store — Encrypted local audit store for Pagelock PII Audit
//!
//! # Encryption strategy
//! SQLite does NOT natively encrypt.  We use application-level encryption:
//! - Sensitive columns (detected values, sensitive contexts) are stored as
//!   XChaCha20-Poly1305 ciphertext, base64-encoded.
//! - The vault key is derived from an operator passphrase via Argon2id and
//!   held in memory only while the audit store is unlocked.
//! - Queryable metadata (scan ids, space keys, statuses, progress, masked
//!   contexts) is stored in plaintext — masked contexts carry no raw PII.
//!
//! # Concurrency
//! Checkpoint and severity-count writes are single atomic
//! `INSERT .. ON CONFLICT DO UPDATE` statements, so concurrent scan workers
//! for the same (scan, space) can never lose updates.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on first open.

pub mod checkpoint;
pub mod db;
pub mod error;
pub mod events;
pub mod migrations;
pub mod models;
pub mod severity_counts;
pub mod vault;

pub use checkpoint::{CheckpointStore, NewCheckpoint, UpsertOutcome};
pub use db::Store;
pub use error::StoreError;
pub use events::{EventStore, StoredEvent};
pub use severity_counts::SeverityCountStore;
pub use vault::Vault;
