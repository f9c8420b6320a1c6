//! Defines the `KemProvider` trait for crypto-agility.

use crate::crypto::SharedSecret;
use crate::error::CryptoError;
use core::fmt::Debug;
use zeroize::Zeroizing;

/// How much protection a provider actually gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    /// Lattice-based KEM, resistant to quantum adversaries.
    PostQuantum,
    /// Classical stand-in. Confidential today, not post-quantum.
    ClassicalFallback,
}

impl SecurityLevel {
    pub fn is_degraded(self) -> bool {
        self != SecurityLevel::PostQuantum
    }
}

/// A key-encapsulation mechanism with fixed byte layouts.
///
/// Every provider produces keys and ciphertexts of exactly
/// [`crate::crypto::PUBLIC_KEY_LEN`], [`crate::crypto::PRIVATE_KEY_LEN`] and
/// [`crate::crypto::KEM_CIPHERTEXT_LEN`] bytes, so callers never learn which
/// one is active from the data alone. Length validation happens in
/// [`crate::crypto::adapter::PrimitiveAdapter`] before a provider is called.
pub trait KemProvider: Send + Sync + Debug + 'static {
    /// Human-readable algorithm name, for logs.
    fn algorithm(&self) -> &'static str;

    fn security_level(&self) -> SecurityLevel;

    /// Generates a new key pair: `(public, private)`.
    fn generate_keypair(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError>;

    /// Encapsulates a fresh shared secret to `public_key`.
    /// Returns the shared secret and the ciphertext to send to the key owner.
    fn encapsulate(&self, public_key: &[u8]) -> Result<(SharedSecret, Vec<u8>), CryptoError>;

    /// Recovers the shared secret from `ciphertext` with the matching private key.
    fn decapsulate(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<SharedSecret, CryptoError>;

    /// Runs a full keypair / encapsulate / decapsulate cycle.
    fn self_test(&self) -> Result<(), CryptoError> {
        let (public_key, private_key) = self.generate_keypair()?;
        let (sent, ciphertext) = self.encapsulate(&public_key)?;
        let received = self.decapsulate(&private_key, &ciphertext)?;
        if *sent != *received {
            return Err(CryptoError::Unavailable(format!(
                "{} self-test produced mismatched secrets",
                self.algorithm()
            )));
        }
        Ok(())
    }
}
