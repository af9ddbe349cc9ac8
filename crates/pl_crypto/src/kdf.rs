//! Key derivation functions
//!
//! `vault_key_from_passphrase` — Argon2id, derives the 32-byte key used to
//!   encrypt sensitive findings columns in the local SQLite audit store.
//!
//! `hkdf_expand` — HKDF-SHA256, used to derive per-purpose subkeys from the
//!   vault key (e.g. a distinct key for attachment payloads).

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Vault key (Argon2id) ──────────────────────────────────────────────────────

/// 32-byte vault key derived from an operator passphrase. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

/// Argon2id parameters — tuned for interactive use on an operator machine.
fn argon2_params() -> Params {
    Params::new(
        64 * 1024, // m_cost: 64 MiB
        3,         // t_cost: 3 iterations
        1,         // p_cost: 1 thread
        Some(32),  // output len
    )
    .expect("Static Argon2 params are always valid")
}

/// Derive a vault key from a passphrase + 16-byte salt.
/// The salt is stored alongside the audit store (not secret).
pub fn vault_key_from_passphrase(
    passphrase: &[u8],
    salt: &[u8; 16],
) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params());
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Generate a fresh random 16-byte salt (call once on first run; store it).
pub fn generate_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be empty (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive a 32-byte purpose-bound subkey from the vault key.
pub fn derive_subkey(vault_key: &[u8; 32], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    hkdf_expand(vault_key, Some(b"pagelock-audit-v1"), info, &mut key)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_passphrase_and_salt_derive_same_key() {
        let salt = [3u8; 16];
        let a = vault_key_from_passphrase(b"hunter2", &salt).unwrap();
        let b = vault_key_from_passphrase(b"hunter2", &salt).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn different_salt_derives_different_key() {
        let a = vault_key_from_passphrase(b"hunter2", &[1u8; 16]).unwrap();
        let b = vault_key_from_passphrase(b"hunter2", &[2u8; 16]).unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn subkeys_are_purpose_bound() {
        let vault = [9u8; 32];
        let a = derive_subkey(&vault, b"findings").unwrap();
        let b = derive_subkey(&vault, b"attachments").unwrap();
        assert_ne!(a, b);
    }
}
