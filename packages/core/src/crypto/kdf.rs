//! Key derivation
//!
//! `derive_session_key` / `derive_message_key`: HKDF-SHA256 over a KEM shared
//! secret, each with its own fixed context label.
//!
//! `derive_password_key`: Argon2id, derives the key that seals a user's
//! private key at rest.

use crate::crypto::{AeadKey, AEAD_KEY_LEN};
use crate::error::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

pub const SESSION_KEY_LABEL: &[u8] = b"postern/session-key/v1";
pub const MESSAGE_KEY_LABEL: &[u8] = b"postern/message-key/v1";

pub const SALT_LEN: usize = 16;

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand a shared secret into a 32-byte AEAD key under `label`.
pub fn derive_key(shared_secret: &[u8], label: &[u8]) -> Result<AeadKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    hk.expand(label, key.as_mut_slice())?;
    Ok(key)
}

pub fn derive_session_key(shared_secret: &[u8]) -> Result<AeadKey, CryptoError> {
    derive_key(shared_secret, SESSION_KEY_LABEL)
}

pub fn derive_message_key(shared_secret: &[u8]) -> Result<AeadKey, CryptoError> {
    derive_key(shared_secret, MESSAGE_KEY_LABEL)
}

// ── Argon2id ──────────────────────────────────────────────────────────────────

/// Argon2id cost parameters. Stored with every sealed private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordKdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl PasswordKdfParams {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// Derive an AEAD key from a password and a 16-byte salt.
pub fn derive_password_key(
    password: &[u8],
    salt: &[u8],
    params: PasswordKdfParams,
) -> Result<AeadKey, CryptoError> {
    CryptoError::check_len("password salt", SALT_LEN, salt.len())?;

    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(AEAD_KEY_LEN),
    )?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; AEAD_KEY_LEN]);
    argon2.hash_password_into(password, salt, key.as_mut_slice())?;
    Ok(key)
}

/// Generate a fresh random salt (one per user; stored with the sealed key).
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: PasswordKdfParams = PasswordKdfParams {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn test_labels_separate_keys() {
        let secret = [42u8; 32];
        let session = derive_session_key(&secret).unwrap();
        let message = derive_message_key(&secret).unwrap();

        assert_ne!(*session, *message);
        assert_eq!(*session, *derive_session_key(&secret).unwrap());
    }

    #[test]
    fn test_password_key_deterministic() {
        let salt = generate_salt();
        let k1 = derive_password_key(b"correct horse", &salt, FAST).unwrap();
        let k2 = derive_password_key(b"correct horse", &salt, FAST).unwrap();
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_password_key_depends_on_salt_and_password() {
        let salt1 = generate_salt();
        let salt2 = generate_salt();
        assert_ne!(salt1, salt2);

        let base = derive_password_key(b"pw", &salt1, FAST).unwrap();
        assert_ne!(*base, *derive_password_key(b"pw", &salt2, FAST).unwrap());
        assert_ne!(*base, *derive_password_key(b"other", &salt1, FAST).unwrap());
    }

    #[test]
    fn test_bad_salt_and_params() {
        assert!(matches!(
            derive_password_key(b"pw", &[0u8; 8], FAST),
            Err(CryptoError::InvalidLength { .. })
        ));

        let broken = PasswordKdfParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            derive_password_key(b"pw", &[0u8; SALT_LEN], broken),
            Err(CryptoError::KeyDerivationError(_))
        ));
    }
}
