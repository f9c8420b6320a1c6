use thiserror::Error;

/// Failures raised by the cryptographic primitives themselves.
///
/// These never carry key material. Higher layers translate them into
/// [`crate::utils::error::PosternError`] with the right policy meaning
/// (a failed open during unlock is a wrong password, during a read it is a
/// forged message).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Failed to generate keys: {0}")]
    KeyGenerationError(String),
    #[error("KEM encapsulation failed: {0}")]
    KemEncapsulationError(String),
    #[error("KEM decapsulation failed: {0}")]
    KemDecapsulationError(String),
    #[error("AEAD encryption failed: {0}")]
    AeadEncryptionError(String),
    #[error("AEAD authentication failed")]
    AeadAuthenticationError,
    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),
    #[error("Invalid {what} length: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid input: {0}")]
    InvalidInputError(String),
    #[error("No key encapsulation mechanism available: {0}")]
    Unavailable(String),
}

impl CryptoError {
    /// Length check used before any primitive is invoked.
    pub fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), CryptoError> {
        if expected != actual {
            return Err(CryptoError::InvalidLength {
                what,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl From<argon2::Error> for CryptoError {
    fn from(err: argon2::Error) -> Self {
        CryptoError::KeyDerivationError(err.to_string())
    }
}

impl From<hkdf::InvalidLength> for CryptoError {
    fn from(err: hkdf::InvalidLength) -> Self {
        CryptoError::KeyDerivationError(err.to_string())
    }
}
