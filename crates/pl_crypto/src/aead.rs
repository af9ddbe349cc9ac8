//! Findings encryption: XChaCha20-Poly1305 with associated data.
//!
//! The 24-byte nonce is drawn fresh per encryption and travels with the
//! ciphertext, so stored values are self-contained:
//!
//!   [ nonce (24) | ciphertext || tag (16) ]
//!
//! The AAD binds a ciphertext to its storage context; decrypting with a
//! different context fails authentication.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 24;

fn cipher(key: &[u8; 32]) -> Result<XChaCha20Poly1305, CryptoError> {
    XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKey("expected a 32-byte AEAD key".into()))
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let sealed = cipher(key)?
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt wire-format bytes produced by [`encrypt`].  The plaintext is
/// returned zeroizing, since callers hold raw PII in it.
pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce, sealed) = data.split_at(NONCE_LEN);
    let plaintext = cipher(key)?
        .decrypt(XNonce::from_slice(nonce), Payload { msg: sealed, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}
