// AES-256-GCM with a detached tag

use crate::crypto::{AEAD_KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::CryptoError;
use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;

/// Output of a seal: ciphertext is exactly as long as the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    CryptoError::check_len("AEAD key", AEAD_KEY_LEN, key.len())?;
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidInputError(e.to_string()))
}

/// Encrypts `plaintext` under `key`, binding `aad`.
///
/// A fresh random nonce is used unless one is supplied.
pub fn seal(
    key: &[u8],
    plaintext: &[u8],
    nonce: Option<[u8; NONCE_LEN]>,
    aad: &[u8],
) -> Result<SealedBox, CryptoError> {
    let cipher = cipher(key)?;
    let nonce = nonce.unwrap_or_else(generate_nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
        .map_err(|e| CryptoError::AeadEncryptionError(e.to_string()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(SealedBox {
        nonce,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypts and authenticates. Never returns unauthenticated plaintext.
pub fn open(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    CryptoError::check_len("AEAD nonce", NONCE_LEN, nonce.len())?;
    CryptoError::check_len("AEAD tag", TAG_LEN, tag.len())?;
    let cipher = cipher(key)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut buffer, Tag::from_slice(tag))
        .map_err(|_| CryptoError::AeadAuthenticationError)?;

    Ok(buffer)
}
