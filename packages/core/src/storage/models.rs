// Persisted data models

use crate::protocol::messages::WireMessage;
use crate::utils::error::{PosternError, Result};
use serde::{Deserialize, Serialize};

/// A user's long-term key pair as persisted.
///
/// `private_key_encrypted` is the password-sealed blob produced by
/// [`crate::crypto::master_key::seal_private_key`]; the decrypted key never
/// reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKeyPair {
    pub user_id: String,
    #[serde(with = "crate::utils::b64::bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::utils::b64::bytes")]
    pub private_key_encrypted: Vec<u8>,
    pub created_at: i64,
}

/// A delivered message. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: i64,
    pub body: WireMessage,
}

/// Request status. Transitions are one-way out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Accepted)
                | (RequestStatus::Pending, RequestStatus::Declined)
        )
    }

    /// Returns `next` if the move is legal, `InvalidTransition` otherwise.
    pub fn transition(self, next: RequestStatus) -> Result<RequestStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PosternError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// What the recipient does with a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Accept,
    Decline,
}

impl RequestAction {
    pub fn target_status(self) -> RequestStatus {
        match self {
            RequestAction::Accept => RequestStatus::Accepted,
            RequestAction::Decline => RequestStatus::Declined,
        }
    }
}

/// First contact between two users without an accepted relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: WireMessage,
    pub timestamp: i64,
    pub status: RequestStatus,
}

impl MessageRequest {
    /// The message an accepted request turns into. Keeps id, timestamp and body.
    pub fn to_message(&self) -> StoredMessage {
        StoredMessage {
            id: self.id.clone(),
            sender_id: self.sender_id.clone(),
            recipient_id: self.recipient_id.clone(),
            timestamp: self.timestamp,
            body: self.body.clone(),
        }
    }
}

/// Unordered pair of user ids; `(a, b)` and `(b, a)` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserPair(String, String);

impl UserPair {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            UserPair(a.to_string(), b.to_string())
        } else {
            UserPair(b.to_string(), a.to_string())
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.0 == user_id || self.1 == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Accepted));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Declined));

        assert!(!RequestStatus::Accepted.can_transition_to(RequestStatus::Accepted));
        assert!(!RequestStatus::Declined.can_transition_to(RequestStatus::Accepted));
        assert!(!RequestStatus::Accepted.can_transition_to(RequestStatus::Pending));

        assert_eq!(
            RequestStatus::Accepted.transition(RequestStatus::Declined),
            Err(PosternError::InvalidTransition {
                from: RequestStatus::Accepted,
                to: RequestStatus::Declined,
            })
        );
    }

    #[test]
    fn test_user_pair_is_unordered() {
        assert_eq!(UserPair::new("alice", "bob"), UserPair::new("bob", "alice"));
        assert_ne!(UserPair::new("alice", "bob"), UserPair::new("alice", "carol"));
        assert!(UserPair::new("bob", "alice").contains("alice"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RequestStatus::Declined).unwrap();
        assert_eq!(json, "\"declined\"");
    }
}
