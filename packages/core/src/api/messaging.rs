// Message crypto pipeline
// Chooses message-level, transport or plaintext protection for outgoing
// bodies and opens incoming ones for a viewer.

use crate::crypto::adapter::PrimitiveAdapter;
use crate::crypto::aead::SealedBox;
use crate::crypto::keys::LongTermKeyManager;
use crate::crypto::session::SessionManager;
use crate::crypto::{kdf, AeadKey};
use crate::error::CryptoError;
use crate::protocol::messages::{EncryptionType, WireMessage};
use crate::protocol::wire::associated_data;
use crate::storage::models::StoredMessage;
use crate::utils::error::{PosternError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct MessagePipeline {
    adapter: PrimitiveAdapter,
    keys: Arc<LongTermKeyManager>,
    sessions: Arc<SessionManager>,
    message_level_encryption: bool,
    max_plaintext_bytes: usize,
}

impl MessagePipeline {
    pub fn new(
        adapter: PrimitiveAdapter,
        keys: Arc<LongTermKeyManager>,
        sessions: Arc<SessionManager>,
        message_level_encryption: bool,
        max_plaintext_bytes: usize,
    ) -> Self {
        Self {
            adapter,
            keys,
            sessions,
            message_level_encryption,
            max_plaintext_bytes,
        }
    }

    /// Protects `plaintext` for `recipient_id`.
    ///
    /// 1. recipient public key known and message-level encryption on: `message_pq`
    /// 2. sender has a live session key: `transport`
    /// 3. otherwise: `plaintext`, with a warning
    pub fn encrypt_outgoing(&self, sender_id: &str, recipient_id: &str, plaintext: &str) -> Result<WireMessage> {
        if plaintext.len() > self.max_plaintext_bytes {
            return Err(PosternError::InvalidInput(format!(
                "message of {} bytes exceeds the {} byte limit",
                plaintext.len(),
                self.max_plaintext_bytes
            )));
        }

        if self.message_level_encryption {
            if let Some(public_key) = self.recipient_public_key(recipient_id)? {
                return self.seal_message_pq(sender_id, recipient_id, &public_key, plaintext);
            }
        }

        if let Some(session_key) = self.sessions.get_session_key(sender_id) {
            return self.seal_transport(&session_key, sender_id, recipient_id, plaintext.as_bytes());
        }

        warn!(
            target: "api::messaging",
            sender_id,
            recipient_id,
            "no recipient key and no session: sending plaintext"
        );
        Ok(WireMessage::plaintext(plaintext))
    }

    fn recipient_public_key(&self, recipient_id: &str) -> Result<Option<Vec<u8>>> {
        match self.keys.get_public_key(recipient_id) {
            Ok(key) => Ok(Some(key)),
            Err(PosternError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn seal_message_pq(
        &self,
        sender_id: &str,
        recipient_id: &str,
        public_key: &[u8],
        plaintext: &str,
    ) -> Result<WireMessage> {
        let (shared_secret, kem_ciphertext) = self.adapter.encapsulate(public_key)?;
        let message_key = kdf::derive_message_key(shared_secret.as_slice())?;

        let aad = associated_data(EncryptionType::MessagePq, sender_id, recipient_id);
        let sealed = self
            .adapter
            .aead_seal(message_key.as_slice(), plaintext.as_bytes(), None, &aad)?;

        Ok(WireMessage::MessagePq {
            nonce: sealed.nonce.to_vec(),
            ciphertext: sealed.ciphertext,
            auth_tag: sealed.tag.to_vec(),
            kem_ciphertext,
        })
    }

    fn seal_transport(
        &self,
        session_key: &AeadKey,
        sender_id: &str,
        recipient_id: &str,
        plaintext: &[u8],
    ) -> Result<WireMessage> {
        let aad = associated_data(EncryptionType::Transport, sender_id, recipient_id);
        let sealed = self.adapter.aead_seal(session_key.as_slice(), plaintext, None, &aad)?;

        Ok(WireMessage::Transport {
            nonce: sealed.nonce.to_vec(),
            ciphertext: sealed.ciphertext,
            auth_tag: sealed.tag.to_vec(),
        })
    }

    /// Opens a stored message for `viewer_id`.
    pub fn decrypt_incoming(&self, viewer_id: &str, message: &StoredMessage) -> Result<String> {
        self.decrypt_body(viewer_id, &message.sender_id, &message.recipient_id, &message.body)
    }

    /// Opens `body` sent from `sender_id` to `recipient_id` for `viewer_id`.
    ///
    /// `message_pq` needs the recipient's cached private key. `transport` is
    /// stored under the sender's session key; a recipient also needs a live
    /// session of their own, and the body is re-targeted to it before opening.
    /// A missing key is `KeyNotCached`, a bad tag is `Forged`.
    pub fn decrypt_body(
        &self,
        viewer_id: &str,
        sender_id: &str,
        recipient_id: &str,
        body: &WireMessage,
    ) -> Result<String> {
        if viewer_id != sender_id && viewer_id != recipient_id {
            return Err(PosternError::Forbidden);
        }
        body.validate()?;

        let result = match body {
            WireMessage::Plaintext { content } => return Ok(content.clone()),
            WireMessage::MessagePq {
                nonce,
                ciphertext,
                auth_tag,
                kem_ciphertext,
            } => {
                let private_key = self
                    .keys
                    .get_cached_private_key(recipient_id)
                    .ok_or_else(PosternError::key_not_cached)?;

                let message_key = match self.adapter.decapsulate(&private_key, kem_ciphertext) {
                    Ok(shared_secret) => kdf::derive_message_key(shared_secret.as_slice())?,
                    // Only contributory-check failures get here; sizes were validated above
                    Err(CryptoError::KemDecapsulationError(_)) => return Err(self.forged(viewer_id)),
                    Err(err) => return Err(err.into()),
                };

                let aad = associated_data(EncryptionType::MessagePq, sender_id, recipient_id);
                self.adapter
                    .aead_open(message_key.as_slice(), nonce, ciphertext, auth_tag, &aad)
            }
            WireMessage::Transport {
                nonce,
                ciphertext,
                auth_tag,
            } => {
                let session_key = self
                    .sessions
                    .get_session_key(viewer_id)
                    .ok_or_else(PosternError::key_not_cached)?;

                let aad = associated_data(EncryptionType::Transport, sender_id, recipient_id);
                if viewer_id == sender_id {
                    self.adapter
                        .aead_open(session_key.as_slice(), nonce, ciphertext, auth_tag, &aad)
                } else {
                    // Stored under the sender's session key
                    let sealed = self.reseal_sealed(sender_id, recipient_id, body, &session_key)?;
                    self.adapter.aead_open(
                        session_key.as_slice(),
                        &sealed.nonce,
                        &sealed.ciphertext,
                        &sealed.tag,
                        &aad,
                    )
                }
            }
        };

        let plaintext = match result {
            Ok(plaintext) => plaintext,
            Err(CryptoError::AeadAuthenticationError) => return Err(self.forged(viewer_id)),
            Err(err) => return Err(err.into()),
        };

        String::from_utf8(plaintext)
            .map_err(|e| PosternError::Serialization(format!("message is not UTF-8: {}", e)))
    }

    fn forged(&self, viewer_id: &str) -> PosternError {
        debug!(target: "api::messaging", viewer_id, "message failed authentication");
        PosternError::forged()
    }

    /// Re-targets a transport message from the sender's session key to
    /// `target_id`'s session key. Both keys must be live.
    pub fn reseal_transport(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &WireMessage,
        target_id: &str,
    ) -> Result<WireMessage> {
        if !matches!(body, WireMessage::Transport { .. }) {
            return Err(PosternError::InvalidInput(format!(
                "cannot reseal a {} message",
                body.encryption_type()
            )));
        }
        if target_id != sender_id && target_id != recipient_id {
            return Err(PosternError::Forbidden);
        }

        let target_key = self
            .sessions
            .get_session_key(target_id)
            .ok_or_else(PosternError::key_not_cached)?;
        let sealed = self.reseal_sealed(sender_id, recipient_id, body, &target_key)?;

        Ok(WireMessage::Transport {
            nonce: sealed.nonce.to_vec(),
            ciphertext: sealed.ciphertext,
            auth_tag: sealed.tag.to_vec(),
        })
    }

    /// Opens `body` with the sender's session key and seals it again under `target_key`.
    fn reseal_sealed(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &WireMessage,
        target_key: &AeadKey,
    ) -> Result<SealedBox> {
        let plaintext = self.decrypt_body(sender_id, sender_id, recipient_id, body)?;
        let aad = associated_data(EncryptionType::Transport, sender_id, recipient_id);
        Ok(self
            .adapter
            .aead_seal(target_key.as_slice(), plaintext.as_bytes(), None, &aad)?)
    }
}
