// Long-term key management
// Per-user KEM keypairs: generated at registration, sealed under the user's
// password at rest, cached in memory after a successful unlock.

use crate::crypto::adapter::PrimitiveAdapter;
use crate::crypto::cache::SecretCache;
use crate::crypto::kdf::PasswordKdfParams;
use crate::crypto::master_key;
use crate::crypto::PRIVATE_KEY_LEN;
use crate::error::CryptoError;
use crate::storage::MessageStore;
use crate::utils::error::{PosternError, Result};
use crate::utils::time::Clock;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Freshly generated keys, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKeys {
    pub public_key: Vec<u8>,
    pub private_key_encrypted: Vec<u8>,
}

/// Manager for long-term user keys
pub struct LongTermKeyManager {
    adapter: PrimitiveAdapter,
    store: Arc<dyn MessageStore>,
    kdf_params: PasswordKdfParams,
    cache: SecretCache<Vec<u8>>,
}

impl LongTermKeyManager {
    pub fn new(
        adapter: PrimitiveAdapter,
        store: Arc<dyn MessageStore>,
        kdf_params: PasswordKdfParams,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            adapter,
            store,
            kdf_params,
            cache: SecretCache::new(ttl, clock),
        }
    }

    /// Generates a keypair and seals the private half under `password`.
    ///
    /// # Errors
    ///
    /// `KeyGeneration` if any primitive fails.
    pub fn generate_for_new_user(&self, password: &str) -> Result<GeneratedKeys> {
        let (public_key, private_key) = self.adapter.generate_keypair()?;

        let private_key_encrypted = master_key::seal_private_key(&private_key, password, self.kdf_params)
            .map_err(|e| PosternError::KeyGeneration(e.to_string()))?;

        Ok(GeneratedKeys {
            public_key,
            private_key_encrypted,
        })
    }

    /// Decrypts `encrypted_private_key` with `password` and caches the result
    /// with a fresh TTL, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailure` on a wrong password or an unreadable blob. The
    /// cache is left untouched.
    pub fn unlock(&self, user_id: &str, password: &str, encrypted_private_key: &[u8]) -> Result<()> {
        let ticket = self.cache.begin(user_id);

        let private_key = match master_key::open_private_key(encrypted_private_key, password) {
            Ok(key) => key,
            Err(CryptoError::AeadAuthenticationError) => {
                debug!(target: "crypto::keys", user_id, "unlock rejected: wrong password");
                return Err(PosternError::AuthenticationFailure);
            }
            Err(err) => {
                debug!(target: "crypto::keys", user_id, error = %err, "unlock rejected: unreadable key blob");
                return Err(PosternError::AuthenticationFailure);
            }
        };
        CryptoError::check_len("KEM private key", PRIVATE_KEY_LEN, private_key.len())?;

        if self.cache.insert(ticket, private_key) {
            info!(target: "crypto::keys", user_id, "private key unlocked and cached");
        } else {
            debug!(target: "crypto::keys", user_id, "unlock superseded by a concurrent clear");
        }
        Ok(())
    }

    /// Cached private key, if present and not expired.
    pub fn get_cached_private_key(&self, user_id: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.cache.get(user_id)
    }

    /// Cached key, or unlock from the store with `password`.
    ///
    /// An unknown user fails exactly like a wrong password.
    pub fn get_or_unlock(&self, user_id: &str, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        if let Some(key) = self.cache.get(user_id) {
            return Ok(key);
        }

        let keys = match self.store.get_user_keys(user_id)? {
            Some(keys) => keys,
            None => return Err(self.reject_unknown_user(password)),
        };

        self.unlock(user_id, password, &keys.private_key_encrypted)?;
        self.cache
            .get(user_id)
            .ok_or_else(PosternError::key_not_cached)
    }

    /// Spends one password derivation, then returns `AuthenticationFailure`.
    pub fn reject_unknown_user(&self, password: &str) -> PosternError {
        master_key::burn_password_derivation(password, self.kdf_params);
        PosternError::AuthenticationFailure
    }

    /// Zeroizes and drops the cached key. Called on logout and deletion.
    pub fn clear(&self, user_id: &str) {
        self.cache.remove(user_id);
        debug!(target: "crypto::keys", user_id, "private key cache cleared");
    }

    pub fn get_public_key(&self, user_id: &str) -> Result<Vec<u8>> {
        self.store
            .get_user_public_key(user_id)?
            .ok_or_else(|| PosternError::NotFound(format!("public key for {}", user_id)))
    }

    pub fn sweep_expired(&self) -> usize {
        self.cache.sweep_expired()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}
