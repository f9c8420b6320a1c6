use crate::crypto::provider::{KemProvider, SecurityLevel};
use crate::crypto::{SharedSecret, KEM_CIPHERTEXT_LEN, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, SHARED_SECRET_LEN};
use crate::error::CryptoError;
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use zeroize::Zeroizing;

/// Kyber-768 (ML-KEM-768 round 3) from PQClean.
///
/// Decapsulation uses implicit rejection: a well-sized but tampered ciphertext
/// yields an unrelated shared secret rather than an error. The mismatch then
/// surfaces as an AEAD authentication failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct Kyber768Provider;

fn shared_secret(bytes: &[u8]) -> Result<SharedSecret, CryptoError> {
    CryptoError::check_len("shared secret", SHARED_SECRET_LEN, bytes.len())?;
    let mut out = Zeroizing::new([0u8; SHARED_SECRET_LEN]);
    out.copy_from_slice(bytes);
    Ok(out)
}

impl KemProvider for Kyber768Provider {
    fn algorithm(&self) -> &'static str {
        "Kyber-768"
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::PostQuantum
    }

    fn generate_keypair(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError> {
        let (public_key, secret_key) = kyber768::keypair();

        let public_key = public_key.as_bytes().to_vec();
        let private_key = Zeroizing::new(secret_key.as_bytes().to_vec());

        if public_key.len() != PUBLIC_KEY_LEN || private_key.len() != PRIVATE_KEY_LEN {
            return Err(CryptoError::KeyGenerationError(
                "Kyber-768 produced unexpected key sizes".to_string(),
            ));
        }
        Ok((public_key, private_key))
    }

    fn encapsulate(&self, public_key: &[u8]) -> Result<(SharedSecret, Vec<u8>), CryptoError> {
        CryptoError::check_len("KEM public key", PUBLIC_KEY_LEN, public_key.len())?;

        let public_key = kyber768::PublicKey::from_bytes(public_key)
            .map_err(|e| CryptoError::KemEncapsulationError(e.to_string()))?;
        let (ss, ct) = kyber768::encapsulate(&public_key);

        Ok((shared_secret(ss.as_bytes())?, ct.as_bytes().to_vec()))
    }

    fn decapsulate(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<SharedSecret, CryptoError> {
        CryptoError::check_len("KEM private key", PRIVATE_KEY_LEN, private_key.len())?;
        CryptoError::check_len("KEM ciphertext", KEM_CIPHERTEXT_LEN, ciphertext.len())?;

        let secret_key = kyber768::SecretKey::from_bytes(private_key)
            .map_err(|e| CryptoError::KemDecapsulationError(e.to_string()))?;
        let ciphertext = kyber768::Ciphertext::from_bytes(ciphertext)
            .map_err(|e| CryptoError::KemDecapsulationError(e.to_string()))?;

        let ss = kyber768::decapsulate(&ciphertext, &secret_key);
        shared_secret(ss.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_constants() {
        assert_eq!(kyber768::public_key_bytes(), PUBLIC_KEY_LEN);
        assert_eq!(kyber768::secret_key_bytes(), PRIVATE_KEY_LEN);
        assert_eq!(kyber768::ciphertext_bytes(), KEM_CIPHERTEXT_LEN);
        assert_eq!(kyber768::shared_secret_bytes(), SHARED_SECRET_LEN);
    }

    #[test]
    fn test_kyber_roundtrip() {
        let provider = Kyber768Provider;
        let (public_key, private_key) = provider.generate_keypair().unwrap();

        let (sent, ciphertext) = provider.encapsulate(&public_key).unwrap();
        let received = provider.decapsulate(&private_key, &ciphertext).unwrap();

        assert_eq!(*sent, *received);
    }

    #[test]
    fn test_tampered_ciphertext_gives_different_secret() {
        let provider = Kyber768Provider;
        let (public_key, private_key) = provider.generate_keypair().unwrap();

        let (sent, mut ciphertext) = provider.encapsulate(&public_key).unwrap();
        ciphertext[0] ^= 0x01;
        let received = provider.decapsulate(&private_key, &ciphertext).unwrap();

        assert_ne!(*sent, *received);
    }

    #[test]
    fn test_self_test_passes() {
        assert!(Kyber768Provider.self_test().is_ok());
    }
}
