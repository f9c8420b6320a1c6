//! Stable primitive interface for the rest of the core.
//!
//! The adapter owns the KEM chosen at startup and the AEAD. Every input is
//! length-checked here before any primitive runs, so upstream code sees the
//! same contract whether the real KEM or the fallback is active.

use crate::crypto::aead::{self, SealedBox};
use crate::crypto::provider::SecurityLevel;
use crate::crypto::suites::{self, SelectedProvider};
use crate::crypto::{
    SharedSecret, AEAD_KEY_LEN, KEM_CIPHERTEXT_LEN, NONCE_LEN, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN,
    TAG_LEN,
};
use crate::error::CryptoError;
use std::sync::Arc;
use zeroize::Zeroizing;

#[derive(Debug, Clone)]
pub struct PrimitiveAdapter {
    kem: SelectedProvider,
}

impl PrimitiveAdapter {
    /// Probes the KEM and builds the adapter.
    ///
    /// # Errors
    ///
    /// `Unavailable` when no KEM is usable and the fallback is not allowed.
    pub fn initialize(allow_fallback: bool) -> Result<Self, CryptoError> {
        Ok(Self {
            kem: suites::select_provider(allow_fallback)?,
        })
    }

    pub fn with_provider(kem: SelectedProvider) -> Self {
        Self { kem }
    }

    /// Adapter forced onto the classical fallback.
    pub fn insecure_fallback() -> Self {
        Self::with_provider(SelectedProvider::Fallback(Arc::new(
            suites::ClassicFallbackProvider::new(),
        )))
    }

    pub fn algorithm(&self) -> &'static str {
        self.kem.provider().algorithm()
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.kem.security_level()
    }

    /// KEM operations performed under the fallback so far.
    pub fn degraded_operations(&self) -> u64 {
        self.kem.degraded_operations()
    }

    // === KEM ===

    pub fn generate_keypair(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError> {
        let (public_key, private_key) = self
            .kem
            .provider()
            .generate_keypair()
            .map_err(|e| match e {
                CryptoError::KeyGenerationError(_) => e,
                other => CryptoError::KeyGenerationError(other.to_string()),
            })?;

        CryptoError::check_len("KEM public key", PUBLIC_KEY_LEN, public_key.len())?;
        CryptoError::check_len("KEM private key", PRIVATE_KEY_LEN, private_key.len())?;
        Ok((public_key, private_key))
    }

    pub fn encapsulate(&self, public_key: &[u8]) -> Result<(SharedSecret, Vec<u8>), CryptoError> {
        CryptoError::check_len("KEM public key", PUBLIC_KEY_LEN, public_key.len())?;
        self.kem.provider().encapsulate(public_key)
    }

    pub fn decapsulate(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<SharedSecret, CryptoError> {
        CryptoError::check_len("KEM private key", PRIVATE_KEY_LEN, private_key.len())?;
        CryptoError::check_len("KEM ciphertext", KEM_CIPHERTEXT_LEN, ciphertext.len())?;
        self.kem.provider().decapsulate(private_key, ciphertext)
    }

    // === AEAD ===

    pub fn aead_seal(
        &self,
        key: &[u8],
        plaintext: &[u8],
        nonce: Option<[u8; NONCE_LEN]>,
        aad: &[u8],
    ) -> Result<SealedBox, CryptoError> {
        CryptoError::check_len("AEAD key", AEAD_KEY_LEN, key.len())?;
        aead::seal(key, plaintext, nonce, aad)
    }

    /// Fails with `AeadAuthenticationError` on any tag or ciphertext mismatch.
    pub fn aead_open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        CryptoError::check_len("AEAD key", AEAD_KEY_LEN, key.len())?;
        CryptoError::check_len("AEAD nonce", NONCE_LEN, nonce.len())?;
        CryptoError::check_len("AEAD tag", TAG_LEN, tag.len())?;
        aead::open(key, nonce, ciphertext, tag, aad)
    }
}
