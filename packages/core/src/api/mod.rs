// Public messenger API
// Wires keys, sessions, the message pipeline and the request workflow together

pub mod contacts;
pub mod messaging;

use crate::config::Config;
use crate::crypto::adapter::PrimitiveAdapter;
use crate::crypto::kdf::PasswordKdfParams;
use crate::crypto::keys::LongTermKeyManager;
use crate::crypto::provider::SecurityLevel;
use crate::crypto::session::SessionManager;
use crate::protocol::messages::{EncryptionType, WireMessage};
use crate::protocol::transport::{DeliveryDispatcher, Notifier};
use crate::storage::models::{IdentityKeyPair, MessageRequest, RequestAction, StoredMessage};
use crate::storage::MessageStore;
use crate::utils::error::{DecryptionFailure, PosternError, Result};
use crate::utils::rate_limit::RateLimiter;
use crate::utils::time::{Clock, SystemClock};
use contacts::{RequestManager, SendOutcome};
use messaging::MessagePipeline;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A message as shown to one viewer: metadata always, content when it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayedMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: i64,
    pub encryption_type: EncryptionType,
    #[serde(serialize_with = "serialize_content")]
    pub content: std::result::Result<String, DecryptionFailure>,
}

fn serialize_content<S: serde::Serializer>(
    content: &std::result::Result<String, DecryptionFailure>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match content {
        Ok(text) => serializer.serialize_some(text),
        Err(_) => serializer.serialize_none(),
    }
}

/// Main messenger API
pub struct MessengerAPI {
    config: Config,
    adapter: PrimitiveAdapter,
    store: Arc<dyn MessageStore>,
    keys: Arc<LongTermKeyManager>,
    sessions: Arc<SessionManager>,
    pipeline: MessagePipeline,
    requests: RequestManager,
    login_limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl MessengerAPI {
    /// Builds the API on the wall clock.
    ///
    /// # Errors
    ///
    /// `Unavailable` when no KEM can be used; the process should not start.
    pub fn new(config: Config, store: Arc<dyn MessageStore>, dispatcher: DeliveryDispatcher) -> Result<Self> {
        let adapter = PrimitiveAdapter::initialize(config.allow_insecure_fallback)?;
        Self::with_parts(config, adapter, store, dispatcher, Arc::new(SystemClock))
    }

    /// Builds the API on the wall clock with a delivery worker for `notifier`,
    /// sized and bounded by `delivery_queue_capacity` and `delivery_timeout_ms`.
    ///
    /// Must be called inside a tokio runtime. The worker stops once the API
    /// and every clone of its dispatcher are dropped.
    pub fn with_notifier(
        config: Config,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let adapter = PrimitiveAdapter::initialize(config.allow_insecure_fallback)?;
        let (dispatcher, worker) =
            DeliveryDispatcher::spawn(notifier, config.delivery_queue_capacity, config.delivery_timeout());
        let api = Self::with_parts(config, adapter, store, dispatcher, Arc::new(SystemClock))?;
        Ok((api, worker))
    }

    pub fn with_parts(
        config: Config,
        adapter: PrimitiveAdapter,
        store: Arc<dyn MessageStore>,
        dispatcher: DeliveryDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if adapter.security_level().is_degraded() {
            warn!(
                target: "crypto::kem",
                algorithm = adapter.algorithm(),
                "running with a NON post-quantum KEM"
            );
        }

        let keys = Arc::new(LongTermKeyManager::new(
            adapter.clone(),
            store.clone(),
            PasswordKdfParams::from_config(&config),
            config.private_key_ttl(),
            clock.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            adapter.clone(),
            config.session_key_ttl(),
            clock.clone(),
        )?);
        let pipeline = MessagePipeline::new(
            adapter.clone(),
            keys.clone(),
            sessions.clone(),
            config.message_level_encryption,
            config.max_plaintext_bytes,
        );
        let requests = RequestManager::new(store.clone(), dispatcher, clock.clone());
        let login_limiter = RateLimiter::new(config.login_max_attempts, config.login_window(), clock.clone());

        info!(
            algorithm = adapter.algorithm(),
            security_level = ?adapter.security_level(),
            "messenger core initialized"
        );

        Ok(Self {
            config,
            adapter,
            store,
            keys,
            sessions,
            pipeline,
            requests,
            login_limiter,
            clock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keys(&self) -> &LongTermKeyManager {
        &self.keys
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.adapter.security_level()
    }

    /// KEM operations run under the insecure fallback since startup.
    pub fn degraded_operations(&self) -> u64 {
        self.adapter.degraded_operations()
    }

    // === Accounts ===

    /// Creates and persists the long-term keypair for a new user.
    /// Returns the public key.
    pub fn register(&self, user_id: &str, password: &str) -> Result<Vec<u8>> {
        if user_id.is_empty() {
            return Err(PosternError::InvalidInput("empty user id".to_string()));
        }
        if self.store.get_user_keys(user_id)?.is_some() {
            return Err(PosternError::InvalidInput(format!(
                "user {} already has keys",
                user_id
            )));
        }

        let generated = self.keys.generate_for_new_user(password)?;
        self.store.save_user_keys(IdentityKeyPair {
            user_id: user_id.to_string(),
            public_key: generated.public_key.clone(),
            private_key_encrypted: generated.private_key_encrypted,
            created_at: self.clock.now().timestamp(),
        })?;

        info!(target: "crypto::keys", user_id, "long-term keypair registered");
        Ok(generated.public_key)
    }

    /// Unlocks and caches the user's private key.
    ///
    /// # Errors
    ///
    /// `RateLimited` before any derivation once the attempt budget is spent;
    /// `AuthenticationFailure` for a wrong password or an unknown user alike.
    pub fn login(&self, user_id: &str, password: &str) -> Result<()> {
        self.login_limiter.check(user_id).map_err(|e| {
            warn!(target: "crypto::keys", user_id, "login rate limit exceeded");
            e
        })?;

        let Some(keys) = self.store.get_user_keys(user_id)? else {
            return Err(self.keys.reject_unknown_user(password));
        };

        self.keys.unlock(user_id, password, &keys.private_key_encrypted)?;
        self.login_limiter.reset(user_id);
        Ok(())
    }

    /// Drops both cached secrets for the user.
    pub fn logout(&self, user_id: &str) {
        self.keys.clear(user_id);
        self.sessions.clear(user_id);
        info!(user_id, "user logged out");
    }

    pub fn delete_user(&self, user_id: &str) -> Result<()> {
        self.logout(user_id);
        self.store.delete_user_keys(user_id)?;
        self.login_limiter.reset(user_id);
        info!(user_id, "user keys deleted");
        Ok(())
    }

    pub fn public_key(&self, user_id: &str) -> Result<Vec<u8>> {
        self.keys.get_public_key(user_id)
    }

    // === Handshake ===

    pub fn server_public_key(&self) -> Vec<u8> {
        self.sessions.server_public_key().to_vec()
    }

    pub fn handshake(&self, user_id: &str, client_ciphertext: &[u8]) -> Result<()> {
        self.sessions.establish(user_id, client_ciphertext)
    }

    // === Messages ===

    /// Encrypts `plaintext` and routes it through the request workflow.
    pub fn send_message(&self, sender_id: &str, recipient_id: &str, plaintext: &str) -> Result<SendOutcome> {
        let body = self.pipeline.encrypt_outgoing(sender_id, recipient_id, plaintext)?;
        self.requests.send(sender_id, recipient_id, body)
    }

    /// Routes a body the client already sealed.
    pub fn send_sealed(&self, sender_id: &str, recipient_id: &str, body: WireMessage) -> Result<SendOutcome> {
        body.validate()?;
        self.requests.send(sender_id, recipient_id, body)
    }

    pub fn resolve_request(&self, request_id: &str, actor_id: &str, action: RequestAction) -> Result<MessageRequest> {
        self.requests.resolve_request(request_id, actor_id, action)
    }

    pub fn pending_requests(&self, user_id: &str) -> Result<Vec<MessageRequest>> {
        self.requests.pending_for(user_id)
    }

    /// The conversation between `viewer_id` and `other_id`, oldest first.
    ///
    /// A message that cannot be opened keeps its metadata and carries the
    /// failure reason instead of content.
    pub fn read_conversation(&self, viewer_id: &str, other_id: &str) -> Result<Vec<DisplayedMessage>> {
        let messages = self.store.messages_between(viewer_id, other_id)?;
        Ok(messages
            .iter()
            .map(|message| self.display(viewer_id, message))
            .collect())
    }

    fn display(&self, viewer_id: &str, message: &StoredMessage) -> DisplayedMessage {
        let content = match self.pipeline.decrypt_incoming(viewer_id, message) {
            Ok(text) => Ok(text),
            Err(PosternError::Decryption(reason)) => Err(reason),
            Err(err) => {
                debug!(target: "api::messaging", message_id = %message.id, error = %err, "unreadable stored message");
                Err(DecryptionFailure::Forged)
            }
        };

        DisplayedMessage {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            timestamp: message.timestamp,
            encryption_type: message.body.encryption_type(),
            content,
        }
    }

    // === Maintenance ===

    /// Evicts expired cached keys and stale rate-limit windows.
    /// Returns the number of evicted keys.
    pub fn sweep_expired(&self) -> usize {
        let evicted = self.keys.sweep_expired() + self.sessions.sweep_expired();
        self.login_limiter.prune();
        if evicted > 0 {
            debug!(evicted, "expired cache entries swept");
        }
        evicted
    }

    /// Sweeps every `interval` on the current tokio runtime until the API is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let api: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match api.upgrade() {
                    Some(api) => {
                        api.sweep_expired();
                    }
                    None => break,
                }
            }
        })
    }

    /// `spawn_sweeper` at the configured interval.
    pub fn spawn_default_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        self.spawn_sweeper(Duration::from_secs(self.config.cache_sweep_interval_secs.max(1)))
    }
}
