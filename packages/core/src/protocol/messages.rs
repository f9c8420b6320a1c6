// Protocol message types
// A sealed message body and the realtime events pushed to connected users

use crate::crypto::{KEM_CIPHERTEXT_LEN, NONCE_LEN, TAG_LEN};
use crate::error::CryptoError;
use crate::storage::models::RequestStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a message body is protected. Always carried as an explicit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionType {
    Plaintext,
    /// Sealed with the sender's handshake session key.
    Transport,
    /// Sealed with a key encapsulated to the recipient's long-term public key.
    MessagePq,
}

impl EncryptionType {
    pub fn as_byte(self) -> u8 {
        match self {
            EncryptionType::Plaintext => 0,
            EncryptionType::Transport => 1,
            EncryptionType::MessagePq => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EncryptionType::Plaintext),
            1 => Some(EncryptionType::Transport),
            2 => Some(EncryptionType::MessagePq),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionType::Plaintext => "plaintext",
            EncryptionType::Transport => "transport",
            EncryptionType::MessagePq => "message_pq",
        }
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message body as it crosses the boundary. Byte fields are base64 in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encryption_type", rename_all = "snake_case")]
pub enum WireMessage {
    Plaintext {
        content: String,
    },
    Transport {
        #[serde(with = "crate::utils::b64::bytes")]
        nonce: Vec<u8>,
        #[serde(with = "crate::utils::b64::bytes")]
        ciphertext: Vec<u8>,
        #[serde(with = "crate::utils::b64::bytes")]
        auth_tag: Vec<u8>,
    },
    MessagePq {
        #[serde(with = "crate::utils::b64::bytes")]
        nonce: Vec<u8>,
        #[serde(with = "crate::utils::b64::bytes")]
        ciphertext: Vec<u8>,
        #[serde(with = "crate::utils::b64::bytes")]
        auth_tag: Vec<u8>,
        #[serde(with = "crate::utils::b64::bytes")]
        kem_ciphertext: Vec<u8>,
    },
}

impl WireMessage {
    pub fn plaintext(content: impl Into<String>) -> Self {
        WireMessage::Plaintext {
            content: content.into(),
        }
    }

    pub fn encryption_type(&self) -> EncryptionType {
        match self {
            WireMessage::Plaintext { .. } => EncryptionType::Plaintext,
            WireMessage::Transport { .. } => EncryptionType::Transport,
            WireMessage::MessagePq { .. } => EncryptionType::MessagePq,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_type() != EncryptionType::Plaintext
    }

    /// Checks the fixed-width fields.
    pub fn validate(&self) -> Result<(), CryptoError> {
        match self {
            WireMessage::Plaintext { .. } => Ok(()),
            WireMessage::Transport { nonce, auth_tag, .. } => {
                CryptoError::check_len("AEAD nonce", NONCE_LEN, nonce.len())?;
                CryptoError::check_len("AEAD tag", TAG_LEN, auth_tag.len())
            }
            WireMessage::MessagePq {
                nonce,
                auth_tag,
                kem_ciphertext,
                ..
            } => {
                CryptoError::check_len("AEAD nonce", NONCE_LEN, nonce.len())?;
                CryptoError::check_len("AEAD tag", TAG_LEN, auth_tag.len())?;
                CryptoError::check_len("KEM ciphertext", KEM_CIPHERTEXT_LEN, kem_ciphertext.len())
            }
        }
    }
}

// ============================================================================
// Realtime events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: i64,
    pub body: WireMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequestPayload {
    pub request_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: i64,
    pub status: RequestStatus,
}

/// Event pushed to a connected user. Serialises as `{"type": .., "payload": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DeliveryEvent {
    NewMessage(NewMessagePayload),
    NewRequest(NewRequestPayload),
}

impl DeliveryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryEvent::NewMessage(_) => "new_message",
            DeliveryEvent::NewRequest(_) => "new_request",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_type_bytes() {
        for t in [
            EncryptionType::Plaintext,
            EncryptionType::Transport,
            EncryptionType::MessagePq,
        ] {
            assert_eq!(EncryptionType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(EncryptionType::from_byte(3), None);
        assert_eq!(EncryptionType::MessagePq.to_string(), "message_pq");
    }

    #[test]
    fn test_wire_message_json_tag() {
        let msg = WireMessage::Transport {
            nonce: vec![0; NONCE_LEN],
            ciphertext: vec![1, 2, 3],
            auth_tag: vec![0; TAG_LEN],
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["encryption_type"], "transport");
        assert_eq!(json["ciphertext"], "AQID");
    }

    #[test]
    fn test_validate_sizes() {
        let msg = WireMessage::MessagePq {
            nonce: vec![0; NONCE_LEN],
            ciphertext: vec![],
            auth_tag: vec![0; TAG_LEN],
            kem_ciphertext: vec![0; 10],
        };
        assert!(matches!(
            msg.validate(),
            Err(CryptoError::InvalidLength { what: "KEM ciphertext", .. })
        ));
        assert!(WireMessage::plaintext("hi").validate().is_ok());
    }

    #[test]
    fn test_delivery_event_shape() {
        let event = DeliveryEvent::NewRequest(NewRequestPayload {
            request_id: "r1".to_string(),
            sender_id: "alice".to_string(),
            recipient_id: "carol".to_string(),
            timestamp: 10,
            status: RequestStatus::Declined,
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "new_request");
        assert_eq!(json["payload"]["status"], "declined");
        assert_eq!(event.kind(), "new_request");
    }
}
