//! Tests for the cryptographic primitives
//!
//! This test suite covers:
//! - KEM round-trips for the selected provider and the classical fallback
//! - AEAD seal/open, including tampering
//! - Password sealing of long-term keys
//! - Byte-exact wire framing

use postern_core::crypto::adapter::PrimitiveAdapter;
use postern_core::crypto::kdf::{self, PasswordKdfParams};
use postern_core::crypto::master_key;
use postern_core::crypto::session::initiate_handshake;
use postern_core::crypto::suites::{select_provider, ClassicFallbackProvider};
use postern_core::crypto::{KemProvider, AEAD_KEY_LEN, KEM_CIPHERTEXT_LEN, NONCE_LEN, PUBLIC_KEY_LEN, TAG_LEN};
use postern_core::error::CryptoError;
use postern_core::protocol::wire;
use postern_core::{EncryptionType, WireMessage};
use proptest::prelude::*;

const FAST: PasswordKdfParams = PasswordKdfParams {
    memory_kib: 8,
    iterations: 1,
    parallelism: 1,
};

/// The provider picked at startup round-trips a shared secret
#[test]
fn test_selected_provider_kem_roundtrip() {
    let adapter = PrimitiveAdapter::initialize(true).unwrap();

    let (public_key, private_key) = adapter.generate_keypair().unwrap();
    assert_eq!(public_key.len(), PUBLIC_KEY_LEN);

    let (sent, ciphertext) = adapter.encapsulate(&public_key).unwrap();
    assert_eq!(ciphertext.len(), KEM_CIPHERTEXT_LEN);

    let received = adapter.decapsulate(&private_key, &ciphertext).unwrap();
    assert_eq!(*sent, *received);
}

/// Strict startup succeeds whenever the post-quantum feature is built in
#[cfg(feature = "post-quantum")]
#[test]
fn test_strict_startup_with_post_quantum() {
    let adapter = PrimitiveAdapter::initialize(false).unwrap();
    assert!(!adapter.security_level().is_degraded());
    assert_eq!(adapter.degraded_operations(), 0);
    assert!(select_provider(false).is_ok());
}

/// Wrong-size KEM inputs never reach the primitive
#[test]
fn test_malformed_kem_inputs_rejected() {
    let adapter = PrimitiveAdapter::initialize(true).unwrap();
    let (_, private_key) = adapter.generate_keypair().unwrap();

    for len in [0, 32, KEM_CIPHERTEXT_LEN - 1, KEM_CIPHERTEXT_LEN + 1] {
        let result = adapter.decapsulate(&private_key, &vec![0u8; len]);
        assert!(
            matches!(result, Err(CryptoError::InvalidLength { .. })),
            "length {} should be rejected",
            len
        );
    }
}

/// Client and server derive the same session key
#[test]
fn test_handshake_session_key_agreement() {
    let adapter = PrimitiveAdapter::initialize(true).unwrap();
    let (server_public, server_private) = adapter.generate_keypair().unwrap();

    let (ciphertext, client_key) = initiate_handshake(&adapter, &server_public).unwrap();
    let shared = adapter.decapsulate(&server_private, &ciphertext).unwrap();
    let server_key = kdf::derive_session_key(shared.as_slice()).unwrap();

    assert_eq!(*client_key, *server_key);
    // Never the raw shared secret
    assert_ne!(server_key.as_slice(), shared.as_slice());
}

/// Sealed private keys open only with the right password
#[test]
fn test_private_key_sealing() {
    let adapter = PrimitiveAdapter::initialize(true).unwrap();
    let (_, private_key) = adapter.generate_keypair().unwrap();

    let blob = master_key::seal_private_key(&private_key, "P1", FAST).unwrap();
    assert!(!blob.windows(32).any(|w| w == &private_key[..32]));

    assert_eq!(*master_key::open_private_key(&blob, "P1").unwrap(), *private_key);
    assert_eq!(
        master_key::open_private_key(&blob, "P2"),
        Err(CryptoError::AeadAuthenticationError)
    );
}

/// Byte layout fixtures
#[test]
fn test_wire_fixtures() {
    assert_eq!(hex::encode(wire::encode(&WireMessage::plaintext("hi"))), "01006869");
    assert_eq!(
        hex::encode(wire::associated_data(EncryptionType::Transport, "a", "b")),
        "010100000001610000000162"
    );

    let frame = hex::decode("01006869").unwrap();
    assert_eq!(wire::decode(&frame).unwrap(), WireMessage::plaintext("hi"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_aead_roundtrip(
        key in prop::array::uniform32(any::<u8>()),
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        aad in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let adapter = PrimitiveAdapter::insecure_fallback();
        let sealed = adapter.aead_seal(&key, &plaintext, None, &aad).unwrap();

        prop_assert_eq!(sealed.ciphertext.len(), plaintext.len());
        prop_assert_eq!(sealed.nonce.len(), NONCE_LEN);
        prop_assert_eq!(sealed.tag.len(), TAG_LEN);

        let opened = adapter
            .aead_open(&key, &sealed.nonce, &sealed.ciphertext, &sealed.tag, &aad)
            .unwrap();
        prop_assert_eq!(opened, plaintext);
    }

    #[test]
    fn prop_aead_tampering_detected(
        key in prop::array::uniform32(any::<u8>()),
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        flip in any::<prop::sample::Index>(),
        bit in 0u8..8,
        in_tag in any::<bool>(),
    ) {
        let adapter = PrimitiveAdapter::insecure_fallback();
        let mut sealed = adapter.aead_seal(&key, &plaintext, None, b"").unwrap();

        if in_tag {
            sealed.tag[flip.index(TAG_LEN)] ^= 1 << bit;
        } else {
            let at = flip.index(sealed.ciphertext.len());
            sealed.ciphertext[at] ^= 1 << bit;
        }

        let result = adapter.aead_open(&key, &sealed.nonce, &sealed.ciphertext, &sealed.tag, b"");
        prop_assert_eq!(result, Err(CryptoError::AeadAuthenticationError));
    }

    #[test]
    fn prop_wire_frame_decodes_to_same_message(
        nonce in prop::array::uniform12(any::<u8>()),
        tag in prop::array::uniform16(any::<u8>()),
        ciphertext in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let message = WireMessage::Transport {
            nonce: nonce.to_vec(),
            ciphertext,
            auth_tag: tag.to_vec(),
        };
        let frame = wire::encode(&message);
        prop_assert_eq!(wire::decode(&frame).unwrap(), message);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_fallback_kem_roundtrip(_seed in any::<u64>()) {
        let provider = ClassicFallbackProvider::new();
        let (public_key, private_key) = provider.generate_keypair().unwrap();
        let (sent, ciphertext) = provider.encapsulate(&public_key).unwrap();
        let received = provider.decapsulate(&private_key, &ciphertext).unwrap();

        prop_assert_eq!(*sent, *received);
        prop_assert_eq!(provider.degraded_operations(), 3);
    }

    #[test]
    fn prop_derived_keys_are_32_bytes(secret in prop::collection::vec(any::<u8>(), 1..64)) {
        let session = kdf::derive_session_key(&secret).unwrap();
        let message = kdf::derive_message_key(&secret).unwrap();

        prop_assert_eq!(session.len(), AEAD_KEY_LEN);
        prop_assert_ne!(*session, *message);
    }
}
