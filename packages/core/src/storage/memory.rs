// In-memory storage for tests and single-process deployments

use crate::storage::models::*;
use crate::storage::MessageStore;
use crate::utils::error::{PosternError, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Tables {
    keys: HashMap<String, IdentityKeyPair>,
    messages: Vec<StoredMessage>,
    requests: HashMap<String, MessageRequest>,
    relations: HashSet<UserPair>,
}

/// In-memory store. One lock guards all tables, so every trait call is atomic.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryStorage {
    // === Keys ===

    fn save_user_keys(&self, keys: IdentityKeyPair) -> Result<()> {
        self.tables.write().keys.insert(keys.user_id.clone(), keys);
        Ok(())
    }

    fn get_user_keys(&self, user_id: &str) -> Result<Option<IdentityKeyPair>> {
        Ok(self.tables.read().keys.get(user_id).cloned())
    }

    fn delete_user_keys(&self, user_id: &str) -> Result<()> {
        self.tables.write().keys.remove(user_id);
        Ok(())
    }

    // === Messages ===

    fn save_message(&self, message: StoredMessage) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.messages.iter().any(|m| m.id == message.id) {
            return Err(PosternError::Storage(format!(
                "message {} already exists",
                message.id
            )));
        }
        tables.messages.push(message);
        Ok(())
    }

    fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        Ok(self
            .tables
            .read()
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    fn messages_between(&self, a: &str, b: &str) -> Result<Vec<StoredMessage>> {
        let mut messages: Vec<StoredMessage> = self
            .tables
            .read()
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.recipient_id == b) || (m.sender_id == b && m.recipient_id == a)
            })
            .cloned()
            .collect();

        // Stable: insertion order breaks timestamp ties
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    // === Requests ===

    fn save_request(&self, request: MessageRequest) -> Result<()> {
        let mut tables = self.tables.write();

        let duplicate = tables.requests.values().any(|r| {
            r.status == RequestStatus::Pending
                && r.sender_id == request.sender_id
                && r.recipient_id == request.recipient_id
        });
        if duplicate {
            return Err(PosternError::DuplicateRequest);
        }
        if tables.requests.contains_key(&request.id) {
            return Err(PosternError::Storage(format!(
                "request {} already exists",
                request.id
            )));
        }

        tables.requests.insert(request.id.clone(), request);
        Ok(())
    }

    fn get_request(&self, request_id: &str) -> Result<Option<MessageRequest>> {
        Ok(self.tables.read().requests.get(request_id).cloned())
    }

    fn update_request_status(
        &self,
        request_id: &str,
        expected: RequestStatus,
        new_status: RequestStatus,
    ) -> Result<MessageRequest> {
        let mut tables = self.tables.write();
        let request = tables
            .requests
            .get_mut(request_id)
            .ok_or_else(|| PosternError::NotFound(format!("request {}", request_id)))?;

        if request.status != expected {
            return Err(PosternError::InvalidTransition {
                from: request.status,
                to: new_status,
            });
        }

        request.status = request.status.transition(new_status)?;
        Ok(request.clone())
    }

    fn find_pending_request(&self, sender_id: &str, recipient_id: &str) -> Result<Option<MessageRequest>> {
        Ok(self
            .tables
            .read()
            .requests
            .values()
            .find(|r| {
                r.status == RequestStatus::Pending
                    && r.sender_id == sender_id
                    && r.recipient_id == recipient_id
            })
            .cloned())
    }

    fn pending_requests_for(&self, recipient_id: &str) -> Result<Vec<MessageRequest>> {
        let mut requests: Vec<MessageRequest> = self
            .tables
            .read()
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending && r.recipient_id == recipient_id)
            .cloned()
            .collect();

        requests.sort_by(|x, y| x.timestamp.cmp(&y.timestamp).then_with(|| x.id.cmp(&y.id)));
        Ok(requests)
    }

    // === Relations ===

    fn record_accepted_relation(&self, a: &str, b: &str) -> Result<()> {
        self.tables.write().relations.insert(UserPair::new(a, b));
        Ok(())
    }

    fn has_accepted_relation(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.tables.read().relations.contains(&UserPair::new(a, b)))
    }
}
