//! Transport session keys.
//!
//! One server KEM keypair per process. A client encapsulates to the server
//! public key; the server decapsulates, runs the result through HKDF and keeps
//! the 32-byte session key for that user until logout or expiry.
//!
//! ```text
//! NoSession --establish--> Active --(expiry | clear)--> NoSession
//! ```
//!
//! Keys do not rotate on their own; a new handshake replaces the old key.

use crate::crypto::adapter::PrimitiveAdapter;
use crate::crypto::cache::SecretCache;
use crate::crypto::{kdf, AeadKey, AEAD_KEY_LEN};
use crate::error::CryptoError;
use crate::utils::error::{PosternError, Result};
use crate::utils::time::Clock;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub struct SessionManager {
    adapter: PrimitiveAdapter,
    server_public_key: Vec<u8>,
    server_private_key: Zeroizing<Vec<u8>>,
    cache: SecretCache<[u8; AEAD_KEY_LEN]>,
}

impl SessionManager {
    /// Generates the server keypair.
    pub fn new(adapter: PrimitiveAdapter, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let (server_public_key, server_private_key) = adapter.generate_keypair()?;
        info!(
            target: "crypto::session",
            algorithm = adapter.algorithm(),
            "server KEM keypair generated"
        );

        Ok(Self {
            adapter,
            server_public_key,
            server_private_key,
            cache: SecretCache::new(ttl, clock),
        })
    }

    pub fn server_public_key(&self) -> &[u8] {
        &self.server_public_key
    }

    /// Completes the handshake for `user_id`, replacing any existing session key.
    ///
    /// # Errors
    ///
    /// `Handshake` when the ciphertext is malformed. An existing session key
    /// stays valid in that case.
    pub fn establish(&self, user_id: &str, client_ciphertext: &[u8]) -> Result<()> {
        let ticket = self.cache.begin(user_id);

        let shared_secret = self
            .adapter
            .decapsulate(&self.server_private_key, client_ciphertext)
            .map_err(|e| {
                debug!(target: "crypto::session", user_id, error = %e, "handshake rejected");
                PosternError::Handshake(e.to_string())
            })?;

        let session_key = kdf::derive_session_key(shared_secret.as_slice())?;

        if self.cache.insert(ticket, session_key) {
            info!(target: "crypto::session", user_id, "session established");
        } else {
            debug!(target: "crypto::session", user_id, "handshake superseded by a concurrent clear");
        }
        Ok(())
    }

    pub fn get_session_key(&self, user_id: &str) -> Option<AeadKey> {
        self.cache.get(user_id)
    }

    pub fn has_session(&self, user_id: &str) -> bool {
        self.cache.contains(user_id)
    }

    pub fn clear(&self, user_id: &str) {
        self.cache.remove(user_id);
        debug!(target: "crypto::session", user_id, "session cleared");
    }

    pub fn sweep_expired(&self) -> usize {
        self.cache.sweep_expired()
    }

    pub fn active_sessions(&self) -> usize {
        self.cache.len()
    }
}

/// Client half of the handshake: encapsulate to the server public key.
///
/// Returns the ciphertext to send and the session key the server will derive.
pub fn initiate_handshake(adapter: &PrimitiveAdapter, server_public_key: &[u8]) -> std::result::Result<(Vec<u8>, AeadKey), CryptoError> {
    let (shared_secret, ciphertext) = adapter.encapsulate(server_public_key)?;
    let session_key = kdf::derive_session_key(shared_secret.as_slice())?;
    Ok((ciphertext, session_key))
}
