// Wire format
//
// Binary frame:
//
//   version (1) | encryption_type (1) | body
//
//   plaintext:  UTF-8 content
//   transport:  nonce (12) | tag (16) | ciphertext
//   message_pq: nonce (12) | tag (16) | kem_ciphertext (1088) | ciphertext
//
// The type byte is authoritative; a frame is never classified by its length.
// JSON form is `WireMessage` with base64 byte fields. JSON without an
// `encryption_type` tag (`{"content": ".."}`) is read as plaintext.

use crate::crypto::{KEM_CIPHERTEXT_LEN, NONCE_LEN, TAG_LEN};
use crate::error::CryptoError;
use crate::protocol::messages::{EncryptionType, WireMessage};
use crate::utils::error::{PosternError, Result};
use serde::Deserialize;

pub const WIRE_VERSION: u8 = 1;

const HEADER_LEN: usize = 2;
const SEALED_PREFIX_LEN: usize = NONCE_LEN + TAG_LEN;

pub fn encode(message: &WireMessage) -> Vec<u8> {
    let mut out = vec![WIRE_VERSION, message.encryption_type().as_byte()];
    match message {
        WireMessage::Plaintext { content } => out.extend_from_slice(content.as_bytes()),
        WireMessage::Transport {
            nonce,
            ciphertext,
            auth_tag,
        } => {
            out.extend_from_slice(nonce);
            out.extend_from_slice(auth_tag);
            out.extend_from_slice(ciphertext);
        }
        WireMessage::MessagePq {
            nonce,
            ciphertext,
            auth_tag,
            kem_ciphertext,
        } => {
            out.extend_from_slice(nonce);
            out.extend_from_slice(auth_tag);
            out.extend_from_slice(kem_ciphertext);
            out.extend_from_slice(ciphertext);
        }
    }
    out
}

fn too_short(what: &'static str, expected: usize, actual: usize) -> PosternError {
    CryptoError::InvalidLength {
        what,
        expected,
        actual,
    }
    .into()
}

pub fn decode(frame: &[u8]) -> Result<WireMessage> {
    if frame.len() < HEADER_LEN {
        return Err(too_short("wire frame header", HEADER_LEN, frame.len()));
    }
    if frame[0] != WIRE_VERSION {
        return Err(PosternError::InvalidInput(format!(
            "unsupported wire version {}",
            frame[0]
        )));
    }
    let encryption_type = EncryptionType::from_byte(frame[1]).ok_or_else(|| {
        PosternError::InvalidInput(format!("unknown encryption type {}", frame[1]))
    })?;
    let body = &frame[HEADER_LEN..];

    let message = match encryption_type {
        EncryptionType::Plaintext => {
            let content = std::str::from_utf8(body)
                .map_err(|e| PosternError::InvalidInput(format!("plaintext is not UTF-8: {}", e)))?;
            WireMessage::plaintext(content)
        }
        EncryptionType::Transport => {
            if body.len() < SEALED_PREFIX_LEN {
                return Err(too_short("transport frame", SEALED_PREFIX_LEN, body.len()));
            }
            let (nonce, rest) = body.split_at(NONCE_LEN);
            let (auth_tag, ciphertext) = rest.split_at(TAG_LEN);
            WireMessage::Transport {
                nonce: nonce.to_vec(),
                ciphertext: ciphertext.to_vec(),
                auth_tag: auth_tag.to_vec(),
            }
        }
        EncryptionType::MessagePq => {
            let min = SEALED_PREFIX_LEN + KEM_CIPHERTEXT_LEN;
            if body.len() < min {
                return Err(too_short("message_pq frame", min, body.len()));
            }
            let (nonce, rest) = body.split_at(NONCE_LEN);
            let (auth_tag, rest) = rest.split_at(TAG_LEN);
            let (kem_ciphertext, ciphertext) = rest.split_at(KEM_CIPHERTEXT_LEN);
            WireMessage::MessagePq {
                nonce: nonce.to_vec(),
                ciphertext: ciphertext.to_vec(),
                auth_tag: auth_tag.to_vec(),
                kem_ciphertext: kem_ciphertext.to_vec(),
            }
        }
    };
    Ok(message)
}

pub fn to_json(message: &WireMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

#[derive(Deserialize)]
struct LegacyPlaintext {
    content: String,
}

/// Parses the JSON form, accepting untagged legacy plaintext bodies.
pub fn from_json(json: &str) -> Result<WireMessage> {
    let value: serde_json::Value = serde_json::from_str(json)?;

    let message = if value.get("encryption_type").is_some() {
        serde_json::from_value::<WireMessage>(value)?
    } else {
        let legacy: LegacyPlaintext = serde_json::from_value(value)?;
        WireMessage::plaintext(legacy.content)
    };

    message.validate()?;
    Ok(message)
}

/// Associated data bound into every seal: who sent what to whom, and how.
pub fn associated_data(encryption_type: EncryptionType, sender_id: &str, recipient_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(HEADER_LEN + 8 + sender_id.len() + recipient_id.len());
    aad.push(WIRE_VERSION);
    aad.push(encryption_type.as_byte());
    for id in [sender_id, recipient_id] {
        aad.extend_from_slice(&(id.len() as u32).to_be_bytes());
        aad.extend_from_slice(id.as_bytes());
    }
    aad
}
