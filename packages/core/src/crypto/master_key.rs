// Password encryption of the long-term private key
// Argon2id for key derivation + AES-256-GCM for encryption
//
// Blob layout:
//
//   version (1) | m_cost u32 LE | t_cost u32 LE | p_cost u32 LE
//   | salt (16) | nonce (12) | ciphertext || tag (16)
//
// The header is bound as associated data, so tampering with the recorded
// parameters fails authentication like a wrong password does.

use crate::crypto::aead;
use crate::crypto::kdf::{self, PasswordKdfParams, SALT_LEN};
use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::error::CryptoError;
use zeroize::Zeroizing;

pub const BLOB_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 4 * 3 + SALT_LEN;
const MIN_BLOB_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

struct Header {
    params: PasswordKdfParams,
    salt: [u8; SALT_LEN],
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = BLOB_VERSION;
        out[1..5].copy_from_slice(&self.params.memory_kib.to_le_bytes());
        out[5..9].copy_from_slice(&self.params.iterations.to_le_bytes());
        out[9..13].copy_from_slice(&self.params.parallelism.to_le_bytes());
        out[13..].copy_from_slice(&self.salt);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < HEADER_LEN {
            return Err(CryptoError::InvalidInputError(
                "sealed private key: header too short".to_string(),
            ));
        }
        if bytes[0] != BLOB_VERSION {
            return Err(CryptoError::InvalidInputError(format!(
                "sealed private key: unsupported version {}",
                bytes[0]
            )));
        }

        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[13..HEADER_LEN]);

        Ok(Self {
            params: PasswordKdfParams {
                memory_kib: u32_at(1),
                iterations: u32_at(5),
                parallelism: u32_at(9),
            },
            salt,
        })
    }
}

/// Seals `private_key` under a key derived from `password` with a fresh salt.
pub fn seal_private_key(
    private_key: &[u8],
    password: &str,
    params: PasswordKdfParams,
) -> Result<Vec<u8>, CryptoError> {
    let header = Header {
        params,
        salt: kdf::generate_salt(),
    }
    .encode();

    let key = kdf::derive_password_key(password.as_bytes(), &header[13..], params)?;
    let sealed = aead::seal(key.as_slice(), private_key, None, &header)?;

    let mut blob = Vec::with_capacity(MIN_BLOB_LEN + sealed.ciphertext.len());
    blob.extend_from_slice(&header);
    blob.extend_from_slice(&sealed.nonce);
    blob.extend_from_slice(&sealed.ciphertext);
    blob.extend_from_slice(&sealed.tag);
    Ok(blob)
}

/// Opens a blob produced by [`seal_private_key`].
///
/// A wrong password surfaces as `AeadAuthenticationError`.
pub fn open_private_key(blob: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(CryptoError::InvalidInputError(
            "sealed private key: too short".to_string(),
        ));
    }

    let header = Header::decode(blob)?;
    let (nonce, rest) = blob[HEADER_LEN..].split_at(NONCE_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

    let key = kdf::derive_password_key(password.as_bytes(), &header.salt, header.params)?;
    let plaintext = aead::open(key.as_slice(), nonce, ciphertext, tag, &blob[..HEADER_LEN])?;
    Ok(Zeroizing::new(plaintext))
}

/// Runs one password derivation at `params` cost and discards the result.
///
/// Lets callers spend the same time on an unknown user as on a wrong password.
pub fn burn_password_derivation(password: &str, params: PasswordKdfParams) {
    let salt = [0u8; SALT_LEN];
    let _ = kdf::derive_password_key(password.as_bytes(), &salt, params);
}
