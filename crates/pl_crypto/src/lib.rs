//! pl_crypto — cryptographic primitives for the Pagelock findings vault
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Findings never touch disk in plaintext: the store encrypts sensitive
//!   columns with the vault key before any INSERT.
//!
//! # Module layout
//! - `aead`  — XChaCha20-Poly1305 encrypt/decrypt helpers
//! - `kdf`   — Argon2id vault-key derivation + HKDF expansion
//! - `error` — unified error type

pub mod aead;
pub mod error;
pub mod kdf;

pub use error::CryptoError;
