use crate::crypto::provider::{KemProvider, SecurityLevel};
use crate::crypto::{SharedSecret, KEM_CIPHERTEXT_LEN, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};
use crate::error::CryptoError;
use rand::rngs::OsRng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

const X25519_LEN: usize = 32;

/// X25519 stand-in used when the post-quantum KEM is unavailable.
///
/// Keys and ciphertexts are laid out in the Kyber-768 sizes so that storage and
/// wire framing do not change:
///
/// ```text
/// public key   = x25519 public (32)             || zero padding
/// private key  = x25519 secret (32) || public (32) || zero padding
/// ciphertext   = ephemeral x25519 public (32)   || zero padding
/// ```
///
/// Not post-quantum. Every operation logs a warning and bumps
/// [`ClassicFallbackProvider::degraded_operations`].
#[derive(Debug, Default)]
pub struct ClassicFallbackProvider {
    degraded_operations: AtomicU64,
}

impl ClassicFallbackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations performed so far under this provider.
    pub fn degraded_operations(&self) -> u64 {
        self.degraded_operations.load(Ordering::Relaxed)
    }

    fn record(&self, operation: &'static str) {
        self.degraded_operations.fetch_add(1, Ordering::Relaxed);
        warn!(
            target: "crypto::kem",
            algorithm = self.algorithm(),
            operation,
            "KEM operation performed with non-post-quantum fallback"
        );
    }
}

fn padded(prefix: &[&[u8]], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for part in prefix {
        out.extend_from_slice(part);
    }
    out.resize(len, 0);
    out
}

fn split_x25519(bytes: &[u8], used: usize, what: &'static str) -> Result<[u8; X25519_LEN], CryptoError> {
    if bytes[used..].iter().any(|b| *b != 0) {
        return Err(CryptoError::InvalidInputError(format!(
            "{} has non-zero padding",
            what
        )));
    }
    let mut out = [0u8; X25519_LEN];
    out.copy_from_slice(&bytes[..X25519_LEN]);
    Ok(out)
}

impl KemProvider for ClassicFallbackProvider {
    fn algorithm(&self) -> &'static str {
        "X25519 (classical fallback)"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::ClassicalFallback
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError> {
        self.record("generate_keypair");

        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        let secret_bytes = Zeroizing::new(secret.to_bytes());

        let public_key = padded(&[public.as_bytes()], PUBLIC_KEY_LEN);
        let private_key = Zeroizing::new(padded(
            &[secret_bytes.as_slice(), public.as_bytes()],
            PRIVATE_KEY_LEN,
        ));
        Ok((public_key, private_key))
    }

    fn encapsulate(&self, public_key: &[u8]) -> Result<(SharedSecret, Vec<u8>), CryptoError> {
        self.record("encapsulate");
        CryptoError::check_len("KEM public key", PUBLIC_KEY_LEN, public_key.len())?;

        let recipient = PublicKey::from(split_x25519(public_key, X25519_LEN, "KEM public key")?);

        let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
        // Get ephemeral public key before consuming ephemeral_secret
        let ephemeral_public = PublicKey::from(&ephemeral_secret);
        let shared = ephemeral_secret.diffie_hellman(&recipient);

        if !shared.was_contributory() {
            return Err(CryptoError::KemEncapsulationError(
                "non-contributory public key".to_string(),
            ));
        }

        let ciphertext = padded(&[ephemeral_public.as_bytes()], KEM_CIPHERTEXT_LEN);
        Ok((Zeroizing::new(shared.to_bytes()), ciphertext))
    }

    fn decapsulate(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<SharedSecret, CryptoError> {
        self.record("decapsulate");
        CryptoError::check_len("KEM private key", PRIVATE_KEY_LEN, private_key.len())?;
        CryptoError::check_len("KEM ciphertext", KEM_CIPHERTEXT_LEN, ciphertext.len())?;

        let secret_bytes = Zeroizing::new(split_x25519(
            private_key,
            2 * X25519_LEN,
            "KEM private key",
        )?);
        let static_secret = StaticSecret::from(*secret_bytes);
        let ephemeral_public = PublicKey::from(split_x25519(ciphertext, X25519_LEN, "KEM ciphertext")?);

        let shared = static_secret.diffie_hellman(&ephemeral_public);
        if !shared.was_contributory() {
            return Err(CryptoError::KemDecapsulationError(
                "non-contributory ciphertext".to_string(),
            ));
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}
